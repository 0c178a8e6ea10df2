//! Persistence port for quizzes, attempts and retake grants.
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::error::{QuizError, Result};
use super::types::{NewQuizAttempt, QuizAttemptRecord, QuizRecord, RetakePermission};

#[async_trait]
pub trait QuizStore: Send + Sync {
    async fn fetch_quiz(&self, quiz_id: Uuid) -> Result<Option<QuizRecord>>;

    /// Attempts for `(user, quiz)` ordered by generation.
    async fn list_attempts(&self, user_id: Uuid, quiz_id: Uuid) -> Result<Vec<QuizAttemptRecord>>;

    /// Must refuse a second record for the same `(user, quiz, generation)`
    /// with [`QuizError::AttemptAlreadyRecorded`].
    ///
    /// A retake also consumes one retake from the stored grant. The grant
    /// check, the counter increment and the insert are a single write: if the
    /// grant is missing, inactive or used up at that moment, nothing is
    /// recorded and [`QuizError::RetakeNotPermitted`] is returned.
    async fn record_attempt(&self, attempt: NewQuizAttempt) -> Result<QuizAttemptRecord>;

    async fn retake_permission(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
    ) -> Result<Option<RetakePermission>>;

    /// Upserts a grant as given.
    async fn save_retake_permission(&self, permission: RetakePermission) -> Result<()>;

    /// Activates the grant in one write, keeping retakes already used.
    /// See [`RetakePermission::granted`].
    async fn grant_retake_permission(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
        max_retakes: i32,
    ) -> Result<RetakePermission>;

    /// Deactivates the grant in one write. `None` when no grant exists.
    async fn revoke_retake_permission(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
    ) -> Result<Option<RetakePermission>>;
}

#[derive(Debug, Default)]
struct StoreState {
    quizzes: HashMap<Uuid, QuizRecord>,
    attempts: HashMap<(Uuid, Uuid), Vec<QuizAttemptRecord>>,
    permissions: HashMap<(Uuid, Uuid), RetakePermission>,
}

/// Map-backed store. Every read-modify-write happens under one write lock.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQuizStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryQuizStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_quiz(&self, quiz: QuizRecord) {
        self.state.write().await.quizzes.insert(quiz.id, quiz);
    }
}

#[async_trait]
impl QuizStore for InMemoryQuizStore {
    async fn fetch_quiz(&self, quiz_id: Uuid) -> Result<Option<QuizRecord>> {
        Ok(self.state.read().await.quizzes.get(&quiz_id).cloned())
    }

    async fn list_attempts(&self, user_id: Uuid, quiz_id: Uuid) -> Result<Vec<QuizAttemptRecord>> {
        let state = self.state.read().await;
        let mut attempts = state
            .attempts
            .get(&(user_id, quiz_id))
            .cloned()
            .unwrap_or_default();
        attempts.sort_by_key(|a| a.generation);
        Ok(attempts)
    }

    async fn record_attempt(&self, attempt: NewQuizAttempt) -> Result<QuizAttemptRecord> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let key = (attempt.user_id, attempt.quiz_id);
        let attempts = state.attempts.entry(key).or_default();

        if attempts.iter().any(|a| a.generation == attempt.generation) {
            return Err(QuizError::AttemptAlreadyRecorded {
                user_id: attempt.user_id,
                quiz_id: attempt.quiz_id,
                generation: attempt.generation,
            });
        }

        if attempt.is_retake {
            let permission = match state.permissions.get_mut(&key) {
                Some(permission) if permission.has_remaining()? => permission,
                _ => {
                    return Err(QuizError::RetakeNotPermitted {
                        user_id: attempt.user_id,
                        quiz_id: attempt.quiz_id,
                    })
                }
            };
            permission.retake_count += 1;
        }

        let record = QuizAttemptRecord {
            id: Uuid::new_v4(),
            user_id: attempt.user_id,
            quiz_id: attempt.quiz_id,
            generation: attempt.generation,
            answers_json: attempt.answers_json,
            score: attempt.score,
            completed: attempt.completed,
            is_retake: attempt.is_retake,
            created_at: Utc::now(),
        };
        attempts.push(record.clone());
        Ok(record)
    }

    async fn retake_permission(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
    ) -> Result<Option<RetakePermission>> {
        Ok(self
            .state
            .read()
            .await
            .permissions
            .get(&(user_id, quiz_id))
            .cloned())
    }

    async fn save_retake_permission(&self, permission: RetakePermission) -> Result<()> {
        self.state
            .write()
            .await
            .permissions
            .insert((permission.user_id, permission.quiz_id), permission);
        Ok(())
    }

    async fn grant_retake_permission(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
        max_retakes: i32,
    ) -> Result<RetakePermission> {
        let mut state = self.state.write().await;
        let permission = RetakePermission::granted(
            state.permissions.get(&(user_id, quiz_id)),
            user_id,
            quiz_id,
            max_retakes,
        )?;
        state
            .permissions
            .insert((user_id, quiz_id), permission.clone());
        Ok(permission)
    }

    async fn revoke_retake_permission(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
    ) -> Result<Option<RetakePermission>> {
        let mut state = self.state.write().await;
        Ok(state.permissions.get_mut(&(user_id, quiz_id)).map(|permission| {
            permission.is_active = false;
            permission.clone()
        }))
    }
}
