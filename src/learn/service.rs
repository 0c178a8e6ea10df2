//! Request-layer facade over the quiz engine.
//!
//! The service owns no state of its own. Every call reloads the quiz, the
//! attempt history and the retake grant from the [`QuizStore`], re-derives the
//! randomized view for the current attempt generation, and only writes through
//! the store.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::QuizSettings;

use super::attempt::{derive_state, evaluate_eligibility, AttemptState, RetakeEligibility};
use super::error::{QuizError, Result};
use super::randomizer::{
    generate_randomized_quiz, map_answers_to_original, AttemptSeed, RandomizedAttemptView,
};
use super::scoring::{rescore_mapped, score, ScoredAttempt};
use super::store::QuizStore;
use super::types::{
    NewQuizAttempt, QuestionBank, QuestionPrompt, QuizAttemptRecord, QuizConfig, QuizRecord,
    RetakePermission, RetakePolicy,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptView {
    pub quiz_id: Uuid,
    pub title: String,
    pub generation: u32,
    pub total_questions: usize,
    pub passing_score: u8,
    pub questions: Vec<QuestionPrompt>,
    pub retake: RetakeEligibility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutcome {
    pub attempt_id: Uuid,
    pub generation: u32,
    pub is_retake: bool,
    pub result: ScoredAttempt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescoredAttempt {
    pub attempt_id: Uuid,
    pub generation: u32,
    pub recorded_score: u8,
    pub current: ScoredAttempt,
}

/// Everything needed to serve or score the next attempt of one user.
struct AttemptContext {
    quiz: QuizRecord,
    config: QuizConfig,
    bank: QuestionBank,
    generation: u32,
    eligibility: RetakeEligibility,
}

pub struct QuizAttemptService {
    store: Arc<dyn QuizStore>,
    settings: QuizSettings,
}

impl QuizAttemptService {
    pub fn new(store: Arc<dyn QuizStore>, settings: QuizSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &QuizSettings {
        &self.settings
    }

    pub fn seed_for(&self, user_id: Uuid, quiz_id: Uuid, generation: u32) -> AttemptSeed {
        AttemptSeed::for_attempt(&self.settings.seed_salt, user_id, quiz_id, generation)
    }

    async fn load_quiz(&self, quiz_id: Uuid) -> Result<QuizRecord> {
        self.store
            .fetch_quiz(quiz_id)
            .await?
            .ok_or(QuizError::QuizNotFound(quiz_id))
    }

    async fn load_context(&self, user_id: Uuid, quiz_id: Uuid) -> Result<AttemptContext> {
        let quiz = self.load_quiz(quiz_id).await?;
        let config = quiz.config(self.settings.sample_size)?;
        let bank = quiz.parse_bank()?;

        let attempts = self.store.list_attempts(user_id, quiz_id).await?;
        let generation = u32::try_from(attempts.len())
            .map_err(|_| QuizError::Storage("attempt count overflow".to_string()))?;
        let permission = self.store.retake_permission(user_id, quiz_id).await?;
        let eligibility = evaluate_eligibility(generation, permission.as_ref())?;

        Ok(AttemptContext {
            quiz,
            config,
            bank,
            generation,
            eligibility,
        })
    }

    fn view_for(&self, user_id: Uuid, ctx: &AttemptContext) -> Result<RandomizedAttemptView> {
        let seed = self.seed_for(user_id, ctx.quiz.id, ctx.generation);
        generate_randomized_quiz(&ctx.bank, ctx.config.sample_size, seed)
    }

    /// Serves the randomized questions for the user's current attempt.
    /// Calling it repeatedly before submitting returns the same view.
    pub async fn fetch_attempt_view(&self, user_id: Uuid, quiz_id: Uuid) -> Result<AttemptView> {
        let ctx = self.load_context(user_id, quiz_id).await?;
        if !ctx.eligibility.can_attempt {
            warn!(
                "Refusing quiz view for user {} on quiz {}: no retake available",
                user_id, quiz_id
            );
            return Err(QuizError::RetakeNotPermitted { user_id, quiz_id });
        }

        let view = self.view_for(user_id, &ctx)?;
        debug!(
            "Serving generation {} of quiz {} to user {} ({} questions)",
            ctx.generation,
            quiz_id,
            user_id,
            view.len()
        );

        Ok(AttemptView {
            quiz_id,
            title: ctx.quiz.title.clone(),
            generation: ctx.generation,
            total_questions: view.len(),
            passing_score: ctx.config.passing_score,
            questions: view.prompts(),
            retake: ctx.eligibility,
        })
    }

    /// Scores positional answers against the re-derived view and records the
    /// attempt with answers keyed by bank question id. A retake is charged to
    /// the grant by the store in the same write that records it, so a grant
    /// revoked while this runs refuses the submission.
    pub async fn submit_attempt(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
        answers: Vec<Option<String>>,
    ) -> Result<SubmissionOutcome> {
        let ctx = self.load_context(user_id, quiz_id).await?;
        if !ctx.eligibility.can_attempt {
            warn!(
                "Refusing submission from user {} on quiz {}: no retake available",
                user_id, quiz_id
            );
            return Err(QuizError::RetakeNotPermitted { user_id, quiz_id });
        }

        let view = self.view_for(user_id, &ctx)?;
        let result = score(&view, &answers, i32::from(ctx.config.passing_score))?;
        let mapped = map_answers_to_original(&view, &answers)?;
        let answers_json = serde_json::to_string(&mapped)
            .map_err(|e| QuizError::Storage(format!("failed to encode answers: {e}")))?;

        let is_retake = ctx.eligibility.is_retake;
        let record = self
            .store
            .record_attempt(NewQuizAttempt {
                user_id,
                quiz_id,
                generation: ctx.generation,
                answers_json,
                score: result.score_percent,
                completed: true,
                is_retake,
            })
            .await?;

        info!(
            "Recorded attempt {} (generation {}) for user {} on quiz {}: {}/{} = {}% ({})",
            record.id,
            ctx.generation,
            user_id,
            quiz_id,
            result.correct_count,
            result.total_questions,
            result.score_percent,
            if result.passed { "passed" } else { "failed" }
        );

        Ok(SubmissionOutcome {
            attempt_id: record.id,
            generation: ctx.generation,
            is_retake,
            result,
        })
    }

    /// Activates (or re-activates) retakes for a user. `max_retakes` defaults
    /// to the quiz's own limit. Used retakes are kept, and the limit is raised
    /// when needed so the grant always opens at least one more attempt.
    pub async fn grant_retake(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
        max_retakes: Option<i32>,
    ) -> Result<RetakePermission> {
        let quiz = self.load_quiz(quiz_id).await?;
        let requested = max_retakes.unwrap_or(quiz.max_retakes);
        // Rejects negative limits before anything is written.
        RetakePolicy::from_stored(requested)?;

        let permission = self
            .store
            .grant_retake_permission(user_id, quiz_id, requested)
            .await?;

        info!(
            "Granted retakes ({:?}, {} used) to user {} on quiz {}",
            permission.policy()?,
            permission.retake_count,
            user_id,
            quiz_id
        );
        Ok(permission)
    }

    pub async fn revoke_retake(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
    ) -> Result<Option<RetakePermission>> {
        let permission = self
            .store
            .revoke_retake_permission(user_id, quiz_id)
            .await?;
        if permission.is_some() {
            info!("Revoked retakes for user {} on quiz {}", user_id, quiz_id);
        }
        Ok(permission)
    }

    pub async fn attempt_history(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
    ) -> Result<Vec<QuizAttemptRecord>> {
        self.store.list_attempts(user_id, quiz_id).await
    }

    /// Re-scores every stored attempt against the quiz's current bank.
    pub async fn rescore_history(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
    ) -> Result<Vec<RescoredAttempt>> {
        let quiz = self.load_quiz(quiz_id).await?;
        let bank = quiz.parse_bank()?;

        self.store
            .list_attempts(user_id, quiz_id)
            .await?
            .into_iter()
            .map(|attempt| {
                let answers = attempt.mapped_answers()?;
                Ok(RescoredAttempt {
                    attempt_id: attempt.id,
                    generation: attempt.generation,
                    recorded_score: attempt.score,
                    current: rescore_mapped(&bank, &answers, quiz.passing_score)?,
                })
            })
            .collect()
    }

    pub async fn attempt_state(&self, user_id: Uuid, quiz_id: Uuid) -> Result<AttemptState> {
        let attempts = self.store.list_attempts(user_id, quiz_id).await?;
        let generation = u32::try_from(attempts.len())
            .map_err(|_| QuizError::Storage("attempt count overflow".to_string()))?;
        let permission = self.store.retake_permission(user_id, quiz_id).await?;
        derive_state(generation, permission.as_ref())
    }
}
