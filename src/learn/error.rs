use uuid::Uuid;

use super::attempt::{AttemptEvent, AttemptState};

#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    #[error("Invalid question bank: {0}")]
    InvalidBank(String),
    #[error("Invalid quiz configuration: {0}")]
    InvalidConfig(String),
    #[error("Answer count mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("Retake not permitted for user {user_id} on quiz {quiz_id}")]
    RetakeNotPermitted { user_id: Uuid, quiz_id: Uuid },
    #[error("Quiz not found: {0}")]
    QuizNotFound(Uuid),
    #[error("Attempt {generation} already recorded for user {user_id} on quiz {quiz_id}")]
    AttemptAlreadyRecorded {
        user_id: Uuid,
        quiz_id: Uuid,
        generation: u32,
    },
    #[error("Cannot apply {event:?} to an attempt in state {state:?}")]
    InvalidTransition {
        state: AttemptState,
        event: AttemptEvent,
    },
    #[error("Storage error: {0}")]
    Storage(String),
}

impl QuizError {
    /// Caller-side failures, as opposed to misconfiguration or storage faults.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::LengthMismatch { .. }
            | Self::RetakeNotPermitted { .. }
            | Self::QuizNotFound(_)
            | Self::AttemptAlreadyRecorded { .. }
            | Self::InvalidTransition { .. } => true,
            Self::InvalidBank(_) | Self::InvalidConfig(_) | Self::Storage(_) => false,
        }
    }
}

impl From<serde_json::Error> for QuizError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidBank(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QuizError>;
