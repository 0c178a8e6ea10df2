use serde::{Deserialize, Serialize};

use super::error::{QuizError, Result};
use super::randomizer::RandomizedAttemptView;
use super::types::{
    validate_passing_score, MappedAnswer, Question, QuestionBank, QuestionId, QuestionKind,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOutcome {
    pub question_id: QuestionId,
    pub is_correct: bool,
    pub submitted: Option<String>,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredAttempt {
    pub correct_count: usize,
    pub total_questions: usize,
    pub score_percent: u8,
    pub passed: bool,
    pub breakdown: Vec<QuestionOutcome>,
}

/// Whether `submitted` answers `question`. `None` is always wrong.
pub fn is_correct(question: &Question, submitted: Option<&str>) -> bool {
    let Some(submitted) = submitted else {
        return false;
    };

    match &question.kind {
        QuestionKind::MultipleChoice {
            options,
            correct_answer,
            ..
        } => submitted
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|index| options.get(index))
            .is_some_and(|option| option == correct_answer),
        // Case-sensitive: "True" does not match "true".
        QuestionKind::TrueFalse { correct_answer } => submitted == correct_answer.as_str(),
        QuestionKind::ShortAnswer { correct_answer } => {
            normalize(submitted) == normalize(correct_answer)
        }
        QuestionKind::Essay { .. } => !submitted.trim().is_empty(),
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// `round(100 * correct / total)`, halves rounded up.
pub fn score_percent(correct: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (200 * correct + total) / (2 * total);
    percent.min(100) as u8
}

/// Scores positional answers against the view they were given for. Pure.
pub fn score(
    view: &RandomizedAttemptView,
    submitted: &[Option<String>],
    passing_score_percent: i32,
) -> Result<ScoredAttempt> {
    let passing = validate_passing_score(passing_score_percent)?;
    if submitted.len() != view.len() {
        return Err(QuizError::LengthMismatch {
            expected: view.len(),
            actual: submitted.len(),
        });
    }

    let breakdown = view
        .questions
        .iter()
        .zip(submitted)
        .map(|(selected, answer)| outcome(&selected.question, answer.as_deref()))
        .collect();

    Ok(tally(breakdown, passing))
}

/// Re-scores stored answers against the current bank by question id.
/// Answers whose question has since been removed count as incorrect.
pub fn rescore_mapped(
    bank: &QuestionBank,
    answers: &[MappedAnswer],
    passing_score_percent: i32,
) -> Result<ScoredAttempt> {
    let passing = validate_passing_score(passing_score_percent)?;

    let breakdown = answers
        .iter()
        .map(|mapped| match bank.find(&mapped.question_id) {
            Some((_, question)) => outcome(question, mapped.answer.as_answered()),
            None => QuestionOutcome {
                question_id: mapped.question_id.clone(),
                is_correct: false,
                submitted: mapped.answer.as_answered().map(str::to_string),
                explanation: None,
            },
        })
        .collect();

    Ok(tally(breakdown, passing))
}

fn outcome(question: &Question, submitted: Option<&str>) -> QuestionOutcome {
    QuestionOutcome {
        question_id: question.id.clone(),
        is_correct: is_correct(question, submitted),
        submitted: submitted.map(str::to_string),
        explanation: question.explanation.clone(),
    }
}

fn tally(breakdown: Vec<QuestionOutcome>, passing: u8) -> ScoredAttempt {
    let total_questions = breakdown.len();
    let correct_count = breakdown.iter().filter(|o| o.is_correct).count();
    let score_percent = score_percent(correct_count, total_questions);

    ScoredAttempt {
        correct_count,
        total_questions,
        score_percent,
        passed: score_percent >= passing,
        breakdown,
    }
}
