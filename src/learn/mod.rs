//! # Learn Module - Quiz engine
//!
//! Randomized quiz attempts for the LMS:
//! - Question banks parsed from stored `questionsJSON` into typed questions
//! - Seeded, reproducible sampling of each attempt's questions
//! - Scoring for multiple-choice, true/false, short-answer and essay questions
//! - Answers persisted against bank question ids so history survives bank edits
//! - Retake grants and the attempt lifecycle
//!
//! ## Architecture
//!
//! Sampling and scoring are pure functions. [`service::QuizAttemptService`]
//! composes them over a [`store::QuizStore`] port, which the host application
//! implements against its database.

pub mod attempt;
pub mod error;
pub mod randomizer;
pub mod scoring;
pub mod service;
pub mod store;
pub mod types;

pub use attempt::{AttemptEvent, AttemptState, RetakeEligibility};
pub use error::{QuizError, Result};
pub use randomizer::{
    generate_randomized_quiz, map_answers_to_original, AttemptSeed, RandomizedAttemptView,
    SelectedQuestion,
};
pub use scoring::{rescore_mapped, score, QuestionOutcome, ScoredAttempt};
pub use service::{AttemptView, QuizAttemptService, RescoredAttempt, SubmissionOutcome};
pub use store::{InMemoryQuizStore, QuizStore};
pub use types::{
    AnswerValue, MappedAnswer, Question, QuestionBank, QuestionId, QuestionKind, QuestionPrompt,
    QuestionType, QuizConfig, QuizRecord, RetakePermission, RetakePolicy,
};
