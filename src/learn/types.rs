//! Types for the quiz engine
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use super::error::{QuizError, Result};

/// Questions drawn per attempt unless the quiz says otherwise.
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

/// Stored `maxRetakes` values at or above this mean "unlimited".
pub const UNLIMITED_RETAKES_SENTINEL: i32 = 999;

// ============================================================================
// QUESTION BANK
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(String);

impl QuestionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    #[serde(alias = "multiple_choice")]
    MultipleChoice,
    #[serde(alias = "true_false")]
    TrueFalse,
    #[serde(alias = "short_answer")]
    ShortAnswer,
    Essay,
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultipleChoice => write!(f, "multiple-choice"),
            Self::TrueFalse => write!(f, "true-false"),
            Self::ShortAnswer => write!(f, "short-answer"),
            Self::Essay => write!(f, "essay"),
        }
    }
}

/// Answer key for one question, per question type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionKind {
    MultipleChoice {
        options: Vec<String>,
        correct_answer: String,
        /// Position of `correct_answer` in `options`, resolved when the bank is parsed.
        correct_index: usize,
    },
    TrueFalse {
        /// Literal `"true"` or `"false"`.
        correct_answer: String,
    },
    ShortAnswer {
        correct_answer: String,
    },
    Essay {
        reference_answer: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "RawQuestion")]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    pub kind: QuestionKind,
    pub explanation: Option<String>,
}

impl Question {
    pub fn question_type(&self) -> QuestionType {
        match self.kind {
            QuestionKind::MultipleChoice { .. } => QuestionType::MultipleChoice,
            QuestionKind::TrueFalse { .. } => QuestionType::TrueFalse,
            QuestionKind::ShortAnswer { .. } => QuestionType::ShortAnswer,
            QuestionKind::Essay { .. } => QuestionType::Essay,
        }
    }

    pub fn options(&self) -> Option<&[String]> {
        match &self.kind {
            QuestionKind::MultipleChoice { options, .. } => Some(options),
            _ => None,
        }
    }

    /// Student-facing projection: no answer key, no explanation.
    pub fn to_prompt(&self, position: usize) -> QuestionPrompt {
        QuestionPrompt {
            position,
            question_id: self.id.clone(),
            question_type: self.question_type(),
            text: self.text.clone(),
            options: self.options().map(<[String]>::to_vec),
        }
    }

    fn from_raw(index: usize, raw: RawQuestion) -> Result<Self> {
        let invalid = |msg: &str| QuizError::InvalidBank(format!("question {index}: {msg}"));

        let id = match raw.id {
            Some(RawId::Text(id)) if !id.trim().is_empty() => QuestionId(id),
            Some(RawId::Number(n)) => QuestionId(n.to_string()),
            Some(RawId::Text(_)) => return Err(invalid("id is blank")),
            None => QuestionId(index.to_string()),
        };

        if raw.question.trim().is_empty() {
            return Err(invalid("question text is empty"));
        }

        let kind = match raw.question_type {
            QuestionType::MultipleChoice => {
                let options = raw
                    .options
                    .ok_or_else(|| invalid("multiple-choice question has no options"))?;
                if options.len() < 2 {
                    return Err(invalid("multiple-choice question needs at least two options"));
                }
                let correct_answer = match raw.correct_answer {
                    Some(RawAnswer::Text(answer)) => answer,
                    _ => {
                        return Err(invalid(
                            "multiple-choice correct answer must be an option string",
                        ))
                    }
                };
                let correct_index = options
                    .iter()
                    .position(|option| option == &correct_answer)
                    .ok_or_else(|| invalid("correct answer is not among the options"))?;
                QuestionKind::MultipleChoice {
                    options,
                    correct_answer,
                    correct_index,
                }
            }
            QuestionType::TrueFalse => {
                let correct_answer = match raw.correct_answer {
                    Some(RawAnswer::Flag(flag)) => flag.to_string(),
                    Some(RawAnswer::Text(text)) if text == "true" || text == "false" => text,
                    _ => {
                        return Err(invalid(
                            "true-false correct answer must be \"true\" or \"false\"",
                        ))
                    }
                };
                QuestionKind::TrueFalse { correct_answer }
            }
            QuestionType::ShortAnswer => match raw.correct_answer {
                Some(RawAnswer::Text(correct_answer)) if !correct_answer.trim().is_empty() => {
                    QuestionKind::ShortAnswer { correct_answer }
                }
                _ => return Err(invalid("short-answer question has no correct answer")),
            },
            QuestionType::Essay => QuestionKind::Essay {
                reference_answer: match raw.correct_answer {
                    Some(RawAnswer::Text(text)) => Some(text),
                    Some(RawAnswer::Flag(flag)) => Some(flag.to_string()),
                    None => None,
                },
            },
        };

        Ok(Self {
            id,
            text: raw.question,
            kind,
            explanation: raw.explanation,
        })
    }
}

/// Wire shape of a question as stored in `questionsJSON`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuestion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RawId>,
    #[serde(rename = "type")]
    question_type: QuestionType,
    #[serde(alias = "text")]
    question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options: Option<Vec<String>>,
    #[serde(default, alias = "correct_answer", skip_serializing_if = "Option::is_none")]
    correct_answer: Option<RawAnswer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawAnswer {
    Text(String),
    Flag(bool),
}

impl From<Question> for RawQuestion {
    fn from(q: Question) -> Self {
        let question_type = q.question_type();
        let (options, correct_answer) = match q.kind {
            QuestionKind::MultipleChoice {
                options,
                correct_answer,
                ..
            } => (Some(options), Some(correct_answer)),
            QuestionKind::TrueFalse { correct_answer }
            | QuestionKind::ShortAnswer { correct_answer } => (None, Some(correct_answer)),
            QuestionKind::Essay { reference_answer } => (None, reference_answer),
        };
        Self {
            id: Some(RawId::Text(q.id.0)),
            question_type,
            question: q.text,
            options,
            correct_answer: correct_answer.map(RawAnswer::Text),
            explanation: q.explanation,
        }
    }
}

/// Ordered, validated set of questions a quiz samples from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    /// Parses stored `questionsJSON`. Anything that is not an array of
    /// well-formed questions is rejected rather than defaulted.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let items = match value {
            serde_json::Value::Array(items) => items,
            other => {
                return Err(QuizError::InvalidBank(format!(
                    "expected an array of questions, found {}",
                    json_kind(&other)
                )))
            }
        };

        let questions = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let raw: RawQuestion = serde_json::from_value(item).map_err(|e| {
                    QuizError::InvalidBank(format!("question {index}: {e}"))
                })?;
                Question::from_raw(index, raw)
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_questions(questions)
    }

    pub fn from_questions(questions: Vec<Question>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(questions.len());
        for (index, question) in questions.iter().enumerate() {
            if !seen.insert(&question.id) {
                return Err(QuizError::InvalidBank(format!(
                    "question {index}: duplicate id {}",
                    question.id
                )));
            }
        }
        Ok(Self { questions })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.questions).map_err(|e| QuizError::InvalidBank(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn find(&self, id: &QuestionId) -> Option<(usize, &Question)> {
        self.questions
            .iter()
            .enumerate()
            .find(|(_, question)| &question.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter()
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

// ============================================================================
// QUIZ CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "max")]
pub enum RetakePolicy {
    Limited(u32),
    Unlimited,
}

impl RetakePolicy {
    pub fn from_stored(max_retakes: i32) -> Result<Self> {
        if max_retakes >= UNLIMITED_RETAKES_SENTINEL {
            Ok(Self::Unlimited)
        } else {
            u32::try_from(max_retakes).map(Self::Limited).map_err(|_| {
                QuizError::InvalidConfig(format!("max retakes cannot be negative: {max_retakes}"))
            })
        }
    }

    pub fn allows(&self, retakes_used: u32) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Limited(max) => retakes_used < *max,
        }
    }

    pub fn remaining(&self, retakes_used: u32) -> Option<u32> {
        match self {
            Self::Unlimited => None,
            Self::Limited(max) => Some(max.saturating_sub(retakes_used)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizConfig {
    pub sample_size: usize,
    pub passing_score: u8,
    pub retake_policy: RetakePolicy,
}

impl QuizConfig {
    pub fn new(sample_size: usize, passing_score: i32, max_retakes: i32) -> Result<Self> {
        if sample_size == 0 {
            return Err(QuizError::InvalidConfig(
                "sample size must be positive".to_string(),
            ));
        }
        Ok(Self {
            sample_size,
            passing_score: validate_passing_score(passing_score)?,
            retake_policy: RetakePolicy::from_stored(max_retakes)?,
        })
    }
}

pub fn validate_passing_score(passing_score: i32) -> Result<u8> {
    u8::try_from(passing_score)
        .ok()
        .filter(|score| *score <= 100)
        .ok_or_else(|| {
            QuizError::InvalidConfig(format!(
                "passing score must be between 0 and 100, got {passing_score}"
            ))
        })
}

// ============================================================================
// PERSISTENCE RECORDS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizRecord {
    pub id: Uuid,
    pub title: String,
    pub questions_json: String,
    pub passing_score: i32,
    pub max_retakes: i32,
}

impl QuizRecord {
    pub fn parse_bank(&self) -> Result<QuestionBank> {
        QuestionBank::from_json(&self.questions_json)
    }

    pub fn config(&self, sample_size: usize) -> Result<QuizConfig> {
        QuizConfig::new(sample_size, self.passing_score, self.max_retakes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuizAttempt {
    pub user_id: Uuid,
    pub quiz_id: Uuid,
    pub generation: u32,
    pub answers_json: String,
    pub score: u8,
    pub completed: bool,
    pub is_retake: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttemptRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub quiz_id: Uuid,
    pub generation: u32,
    pub answers_json: String,
    pub score: u8,
    pub completed: bool,
    pub is_retake: bool,
    pub created_at: DateTime<Utc>,
}

impl QuizAttemptRecord {
    pub fn mapped_answers(&self) -> Result<Vec<MappedAnswer>> {
        serde_json::from_str(&self.answers_json).map_err(|e| {
            QuizError::Storage(format!("attempt {} has unreadable answers: {e}", self.id))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetakePermission {
    pub user_id: Uuid,
    pub quiz_id: Uuid,
    pub retake_count: u32,
    pub max_retakes: i32,
    pub is_active: bool,
}

impl RetakePermission {
    pub fn policy(&self) -> Result<RetakePolicy> {
        RetakePolicy::from_stored(self.max_retakes)
    }

    pub fn has_remaining(&self) -> Result<bool> {
        Ok(self.is_active && self.policy()?.allows(self.retake_count))
    }

    /// Active grant replacing `previous`. Used retakes are carried over, and a
    /// limited `max_retakes` at or below that count is raised so one more
    /// retake is always open.
    pub fn granted(
        previous: Option<&Self>,
        user_id: Uuid,
        quiz_id: Uuid,
        max_retakes: i32,
    ) -> Result<Self> {
        let retake_count = previous.map_or(0, |p| p.retake_count);
        let max_retakes = match RetakePolicy::from_stored(max_retakes)? {
            RetakePolicy::Limited(max) if max <= retake_count => {
                i32::try_from(retake_count.saturating_add(1))
                    .unwrap_or(UNLIMITED_RETAKES_SENTINEL)
            }
            _ => max_retakes,
        };

        Ok(Self {
            user_id,
            quiz_id,
            retake_count,
            max_retakes,
            is_active: true,
        })
    }
}

// ============================================================================
// ATTEMPT PAYLOADS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionPrompt {
    pub position: usize,
    pub question_id: QuestionId,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "value")]
pub enum AnswerValue {
    Answered(String),
    Unanswered,
}

impl AnswerValue {
    pub fn as_answered(&self) -> Option<&str> {
        match self {
            Self::Answered(value) => Some(value),
            Self::Unanswered => None,
        }
    }
}

impl From<Option<String>> for AnswerValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Unanswered, Self::Answered)
    }
}

/// A submitted answer re-keyed to the bank question it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedAnswer {
    pub question_id: QuestionId,
    pub bank_index: usize,
    pub answer: AnswerValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANK: &str = r#"[
        {"id": "q1", "type": "multiple-choice", "question": "Capital of France?",
         "options": ["Paris", "Lyon", "Nice"], "correctAnswer": "Paris"},
        {"id": 7, "type": "true_false", "question": "The sky is blue", "correctAnswer": true},
        {"type": "short-answer", "question": "Largest city in France?", "correctAnswer": "Paris"},
        {"id": "q4", "type": "essay", "text": "Describe the Loire valley"}
    ]"#;

    #[test]
    fn test_parse_bank_resolves_kinds() {
        let bank = QuestionBank::from_json(BANK).unwrap();
        assert_eq!(bank.len(), 4);

        match &bank.get(0).unwrap().kind {
            QuestionKind::MultipleChoice { correct_index, .. } => assert_eq!(*correct_index, 0),
            other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(bank.get(1).unwrap().id.as_str(), "7");
        assert_eq!(
            bank.get(1).unwrap().kind,
            QuestionKind::TrueFalse {
                correct_answer: "true".to_string()
            }
        );
        // Missing id falls back to the bank index.
        assert_eq!(bank.get(2).unwrap().id.as_str(), "2");
        assert_eq!(bank.get(3).unwrap().question_type(), QuestionType::Essay);
    }

    #[test]
    fn test_non_array_source_is_rejected() {
        let err = QuestionBank::from_json(r#"{"questions": []}"#).unwrap_err();
        assert!(matches!(err, QuizError::InvalidBank(msg) if msg.contains("an object")));

        let err = QuestionBank::from_json("not json").unwrap_err();
        assert!(matches!(err, QuizError::InvalidBank(_)));
    }

    #[test]
    fn test_correct_answer_must_be_an_option() {
        let json = r#"[{"id": "a", "type": "multiple-choice", "question": "?",
            "options": ["x", "y"], "correctAnswer": "z"}]"#;
        let err = QuestionBank::from_json(json).unwrap_err();
        assert!(matches!(err, QuizError::InvalidBank(msg) if msg.starts_with("question 0")));
    }

    #[test]
    fn test_true_false_rejects_other_values() {
        let json =
            r#"[{"id": "a", "type": "true-false", "question": "?", "correctAnswer": "yes"}]"#;
        assert!(QuestionBank::from_json(json).is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"[
            {"id": "a", "type": "essay", "question": "one"},
            {"id": "a", "type": "essay", "question": "two"}
        ]"#;
        let err = QuestionBank::from_json(json).unwrap_err();
        assert!(matches!(err, QuizError::InvalidBank(msg) if msg.contains("duplicate id a")));
    }

    #[test]
    fn test_empty_array_parses_to_empty_bank() {
        let bank = QuestionBank::from_json("[]").unwrap();
        assert!(bank.is_empty());
    }

    #[test]
    fn test_bank_json_round_trip_keeps_answer_key() {
        let bank = QuestionBank::from_json(BANK).unwrap();
        let reparsed = QuestionBank::from_json(&bank.to_json().unwrap()).unwrap();
        assert_eq!(bank, reparsed);
    }

    #[test]
    fn test_prompt_hides_answer_key() {
        let bank = QuestionBank::from_json(BANK).unwrap();
        let prompt = serde_json::to_value(bank.get(0).unwrap().to_prompt(0)).unwrap();
        assert!(prompt.get("correctAnswer").is_none());
        assert_eq!(prompt["type"], "multiple-choice");
        assert_eq!(prompt["options"][1], "Lyon");
    }

    #[test]
    fn test_retake_policy_sentinel() {
        assert_eq!(RetakePolicy::from_stored(999).unwrap(), RetakePolicy::Unlimited);
        assert_eq!(RetakePolicy::from_stored(1500).unwrap(), RetakePolicy::Unlimited);
        assert_eq!(RetakePolicy::from_stored(2).unwrap(), RetakePolicy::Limited(2));
        assert!(RetakePolicy::from_stored(-1).is_err());

        let limited = RetakePolicy::Limited(2);
        assert!(limited.allows(1));
        assert!(!limited.allows(2));
        assert_eq!(limited.remaining(1), Some(1));
        assert_eq!(RetakePolicy::Unlimited.remaining(40), None);
    }

    #[test]
    fn test_grant_always_leaves_a_retake_open() {
        let (user, quiz) = (Uuid::nil(), Uuid::from_u128(1));

        let fresh = RetakePermission::granted(None, user, quiz, 0).unwrap();
        assert_eq!(fresh.max_retakes, 1);
        assert!(fresh.has_remaining().unwrap());

        let exhausted = RetakePermission {
            user_id: user,
            quiz_id: quiz,
            retake_count: 1,
            max_retakes: 1,
            is_active: false,
        };
        let regranted = RetakePermission::granted(Some(&exhausted), user, quiz, 1).unwrap();
        assert_eq!(regranted.retake_count, 1);
        assert_eq!(regranted.max_retakes, 2);
        assert!(regranted.has_remaining().unwrap());

        let roomy = RetakePermission::granted(Some(&exhausted), user, quiz, 5).unwrap();
        assert_eq!(roomy.max_retakes, 5);
        let unlimited = RetakePermission::granted(Some(&exhausted), user, quiz, 999).unwrap();
        assert_eq!(unlimited.policy().unwrap(), RetakePolicy::Unlimited);

        assert!(matches!(
            RetakePermission::granted(None, user, quiz, -1),
            Err(QuizError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_quiz_config_validation() {
        assert!(QuizConfig::new(10, 70, 0).is_ok());
        assert!(matches!(
            QuizConfig::new(0, 70, 0),
            Err(QuizError::InvalidConfig(_))
        ));
        assert!(QuizConfig::new(10, 101, 0).is_err());
        assert!(QuizConfig::new(10, -5, 0).is_err());
    }
}
