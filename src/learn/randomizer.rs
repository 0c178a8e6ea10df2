//! Reproducible question sampling.
//!
//! A randomized view is never stored. It is derived again from the bank and an
//! [`AttemptSeed`] every time it is needed, so the view served to a student and
//! the view their submission is scored against are the same sequence.

use log::debug;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

use super::error::{QuizError, Result};
use super::types::{MappedAnswer, Question, QuestionBank, QuestionPrompt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttemptSeed([u8; 32]);

impl AttemptSeed {
    /// SHA-256 of `"{salt}{user_id}|{quiz_id}|{generation}"`.
    pub fn for_attempt(salt: &str, user_id: Uuid, quiz_id: Uuid, generation: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(format!("{user_id}|{quiz_id}|{generation}").as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(value: &str) -> Result<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(value, &mut bytes)
            .map_err(|e| QuizError::InvalidConfig(format!("invalid seed {value:?}: {e}")))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn rng(&self) -> ChaCha20Rng {
        ChaCha20Rng::from_seed(self.0)
    }
}

impl fmt::Display for AttemptSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedQuestion {
    pub bank_index: usize,
    pub question: Question,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomizedAttemptView {
    pub seed: AttemptSeed,
    pub questions: Vec<SelectedQuestion>,
}

impl RandomizedAttemptView {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn prompts(&self) -> Vec<QuestionPrompt> {
        self.questions
            .iter()
            .enumerate()
            .map(|(position, selected)| selected.question.to_prompt(position))
            .collect()
    }
}

/// Draws `sample_size` distinct questions from `bank` in seeded order.
///
/// Uses a partial Fisher-Yates over bank indices with
/// `j = i + next_u64() % (n - i)`. The draw is written out here instead of
/// going through `SliceRandom` so the sequence depends only on ChaCha20 output.
pub fn generate_randomized_quiz(
    bank: &QuestionBank,
    sample_size: usize,
    seed: AttemptSeed,
) -> Result<RandomizedAttemptView> {
    if bank.is_empty() {
        return Err(QuizError::InvalidBank("question bank is empty".to_string()));
    }
    if sample_size == 0 {
        return Err(QuizError::InvalidConfig(
            "sample size must be positive".to_string(),
        ));
    }

    let n = bank.len();
    let k = sample_size.min(n);
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = seed.rng();

    for i in 0..k {
        let remaining = (n - i) as u64;
        let j = i + (rng.next_u64() % remaining) as usize;
        indices.swap(i, j);
    }
    indices.truncate(k);

    debug!(
        "Sampled {}/{} questions with seed {}: {:?}",
        k, n, seed, indices
    );

    let questions = indices
        .into_iter()
        .filter_map(|bank_index| {
            bank.get(bank_index).map(|question| SelectedQuestion {
                bank_index,
                question: question.clone(),
            })
        })
        .collect();

    Ok(RandomizedAttemptView { seed, questions })
}

/// Re-keys positional answers to the bank questions they were given for.
/// Missing answers become [`AnswerValue::Unanswered`](super::types::AnswerValue).
pub fn map_answers_to_original(
    view: &RandomizedAttemptView,
    submitted: &[Option<String>],
) -> Result<Vec<MappedAnswer>> {
    if submitted.len() != view.len() {
        return Err(QuizError::LengthMismatch {
            expected: view.len(),
            actual: submitted.len(),
        });
    }

    Ok(view
        .questions
        .iter()
        .zip(submitted)
        .map(|(selected, answer)| MappedAnswer {
            question_id: selected.question.id.clone(),
            bank_index: selected.bank_index,
            answer: answer.clone().into(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learn::types::AnswerValue;
    use std::collections::HashSet;

    fn bank(size: usize) -> QuestionBank {
        let items: Vec<serde_json::Value> = (0..size)
            .map(|i| {
                serde_json::json!({
                    "id": format!("q{i}"),
                    "type": "short-answer",
                    "question": format!("Question {i}"),
                    "correctAnswer": format!("answer {i}"),
                })
            })
            .collect();
        QuestionBank::from_json(&serde_json::Value::Array(items).to_string()).unwrap()
    }

    fn seed(generation: u32) -> AttemptSeed {
        AttemptSeed::for_attempt("", Uuid::nil(), Uuid::from_u128(42), generation)
    }

    fn ids(view: &RandomizedAttemptView) -> Vec<String> {
        view.questions
            .iter()
            .map(|q| q.question.id.to_string())
            .collect()
    }

    #[test]
    fn test_same_seed_same_view() {
        let bank = bank(16);
        let first = generate_randomized_quiz(&bank, 10, seed(0)).unwrap();
        let second = generate_randomized_quiz(&bank, 10, seed(0)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_sample_is_distinct_and_sized() {
        let bank = bank(16);
        for generation in 0..20 {
            let view = generate_randomized_quiz(&bank, 10, seed(generation)).unwrap();
            assert_eq!(view.len(), 10);
            let unique: HashSet<_> = view.questions.iter().map(|q| q.bank_index).collect();
            assert_eq!(unique.len(), 10);
            for selected in &view.questions {
                assert_eq!(bank.get(selected.bank_index), Some(&selected.question));
            }
        }
    }

    #[test]
    fn test_sample_size_clamped_to_bank() {
        let bank = bank(4);
        let view = generate_randomized_quiz(&bank, 10, seed(0)).unwrap();
        assert_eq!(view.len(), 4);
        let mut indices: Vec<_> = view.questions.iter().map(|q| q.bank_index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_generations_reshuffle() {
        let bank = bank(30);
        let views: HashSet<Vec<String>> = (0..5)
            .map(|generation| ids(&generate_randomized_quiz(&bank, 10, seed(generation)).unwrap()))
            .collect();
        assert!(views.len() > 1, "different seeds should not all agree");
    }

    #[test]
    fn test_empty_bank_and_zero_sample_rejected() {
        let empty = QuestionBank::default();
        assert!(matches!(
            generate_randomized_quiz(&empty, 10, seed(0)),
            Err(QuizError::InvalidBank(_))
        ));
        assert!(matches!(
            generate_randomized_quiz(&bank(3), 0, seed(0)),
            Err(QuizError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_seed_hex_round_trip() {
        let original = seed(3);
        let parsed = AttemptSeed::from_hex(&original.to_string()).unwrap();
        assert_eq!(original, parsed);
        assert!(AttemptSeed::from_hex("abc").is_err());
    }

    #[test]
    fn test_salt_changes_seed() {
        let a = AttemptSeed::for_attempt("", Uuid::nil(), Uuid::nil(), 0);
        let b = AttemptSeed::for_attempt("tenant-a", Uuid::nil(), Uuid::nil(), 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_map_answers_uses_bank_ids() {
        let bank = bank(16);
        let view = generate_randomized_quiz(&bank, 10, seed(1)).unwrap();
        let mut answers: Vec<Option<String>> = (0..10).map(|i| Some(format!("a{i}"))).collect();
        answers[4] = None;

        let mapped = map_answers_to_original(&view, &answers).unwrap();
        assert_eq!(mapped.len(), 10);
        for (entry, selected) in mapped.iter().zip(&view.questions) {
            assert_eq!(entry.question_id, selected.question.id);
            assert!(bank.find(&entry.question_id).is_some());
        }
        assert_eq!(mapped[4].answer, AnswerValue::Unanswered);
        assert_eq!(mapped[0].answer, AnswerValue::Answered("a0".to_string()));
    }

    #[test]
    fn test_map_answers_length_mismatch() {
        let view = generate_randomized_quiz(&bank(16), 10, seed(0)).unwrap();
        let err = map_answers_to_original(&view, &vec![None::<String>; 9]).unwrap_err();
        assert!(matches!(
            err,
            QuizError::LengthMismatch {
                expected: 10,
                actual: 9
            }
        ));
    }
}
