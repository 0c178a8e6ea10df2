use serde::{Deserialize, Serialize};

use super::error::{QuizError, Result};
use super::types::RetakePermission;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    NotStarted,
    InProgress,
    Submitted,
    RetakeGranted,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptEvent {
    ViewGenerated,
    Submitted,
    RetakeGranted,
    Closed,
}

impl AttemptState {
    pub fn apply(self, event: AttemptEvent) -> Result<Self> {
        use AttemptEvent as E;
        use AttemptState as S;

        match (self, event) {
            // Re-fetching the view before submitting changes nothing.
            (S::NotStarted | S::InProgress | S::RetakeGranted, E::ViewGenerated) => {
                Ok(S::InProgress)
            }
            (S::InProgress, E::Submitted) => Ok(S::Submitted),
            (S::Submitted, E::RetakeGranted) => Ok(S::RetakeGranted),
            (S::Submitted | S::RetakeGranted, E::Closed) => Ok(S::Closed),
            (state, event) => Err(QuizError::InvalidTransition { state, event }),
        }
    }
}

impl std::fmt::Display for AttemptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Submitted => write!(f, "submitted"),
            Self::RetakeGranted => write!(f, "retake_granted"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetakeEligibility {
    pub can_attempt: bool,
    pub is_retake: bool,
    pub attempts_recorded: u32,
    pub retakes_used: u32,
    /// `None` when retakes are unlimited or no grant exists yet.
    pub retakes_remaining: Option<u32>,
}

/// Decides whether the next attempt may start given what is on record.
/// The first attempt is always allowed; later ones need an active grant with
/// retakes left.
pub fn evaluate_eligibility(
    attempts_recorded: u32,
    permission: Option<&RetakePermission>,
) -> Result<RetakeEligibility> {
    let (retakes_used, policy, active) = match permission {
        Some(p) => (p.retake_count, Some(p.policy()?), p.is_active),
        None => (0, None, false),
    };

    if attempts_recorded == 0 {
        return Ok(RetakeEligibility {
            can_attempt: true,
            is_retake: false,
            attempts_recorded,
            retakes_used,
            retakes_remaining: policy.and_then(|p| p.remaining(retakes_used)),
        });
    }

    let can_attempt = active && policy.is_some_and(|p| p.allows(retakes_used));
    Ok(RetakeEligibility {
        can_attempt,
        is_retake: true,
        attempts_recorded,
        retakes_used,
        retakes_remaining: policy.and_then(|p| p.remaining(retakes_used)),
    })
}

/// Lifecycle state implied by stored records. Views are not persisted, so
/// `InProgress` is only reached through [`AttemptState::apply`].
pub fn derive_state(
    attempts_recorded: u32,
    permission: Option<&RetakePermission>,
) -> Result<AttemptState> {
    if attempts_recorded == 0 {
        return Ok(AttemptState::NotStarted);
    }

    let eligibility = evaluate_eligibility(attempts_recorded, permission)?;
    Ok(match (eligibility.can_attempt, permission) {
        (true, _) => AttemptState::RetakeGranted,
        (false, Some(_)) => AttemptState::Closed,
        (false, None) => AttemptState::Submitted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn permission(retake_count: u32, max_retakes: i32, is_active: bool) -> RetakePermission {
        RetakePermission {
            user_id: Uuid::nil(),
            quiz_id: Uuid::nil(),
            retake_count,
            max_retakes,
            is_active,
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let state = AttemptState::NotStarted
            .apply(AttemptEvent::ViewGenerated)
            .unwrap();
        assert_eq!(state, AttemptState::InProgress);
        let state = state.apply(AttemptEvent::ViewGenerated).unwrap();
        assert_eq!(state, AttemptState::InProgress);
        let state = state.apply(AttemptEvent::Submitted).unwrap();
        assert_eq!(state, AttemptState::Submitted);
        let state = state.apply(AttemptEvent::RetakeGranted).unwrap();
        assert_eq!(state, AttemptState::RetakeGranted);
        let state = state.apply(AttemptEvent::ViewGenerated).unwrap();
        assert_eq!(state, AttemptState::InProgress);
    }

    #[test]
    fn test_cannot_score_twice() {
        let err = AttemptState::Submitted
            .apply(AttemptEvent::Submitted)
            .unwrap_err();
        assert!(matches!(
            err,
            QuizError::InvalidTransition {
                state: AttemptState::Submitted,
                event: AttemptEvent::Submitted
            }
        ));
        assert!(AttemptState::NotStarted.apply(AttemptEvent::Submitted).is_err());
        assert!(AttemptState::Closed.apply(AttemptEvent::ViewGenerated).is_err());
    }

    #[test]
    fn test_first_attempt_always_allowed() {
        let eligibility = evaluate_eligibility(0, None).unwrap();
        assert!(eligibility.can_attempt);
        assert!(!eligibility.is_retake);
    }

    #[test]
    fn test_retake_needs_active_grant() {
        assert!(!evaluate_eligibility(1, None).unwrap().can_attempt);
        assert!(!evaluate_eligibility(1, Some(&permission(0, 2, false))).unwrap().can_attempt);

        let eligibility = evaluate_eligibility(1, Some(&permission(0, 2, true))).unwrap();
        assert!(eligibility.can_attempt);
        assert!(eligibility.is_retake);
        assert_eq!(eligibility.retakes_remaining, Some(2));

        let exhausted = evaluate_eligibility(3, Some(&permission(2, 2, true))).unwrap();
        assert!(!exhausted.can_attempt);
        assert_eq!(exhausted.retakes_remaining, Some(0));
    }

    #[test]
    fn test_unlimited_retakes() {
        let eligibility = evaluate_eligibility(50, Some(&permission(49, 999, true))).unwrap();
        assert!(eligibility.can_attempt);
        assert_eq!(eligibility.retakes_remaining, None);
    }

    #[test]
    fn test_derive_state() {
        assert_eq!(derive_state(0, None).unwrap(), AttemptState::NotStarted);
        assert_eq!(derive_state(1, None).unwrap(), AttemptState::Submitted);
        assert_eq!(
            derive_state(1, Some(&permission(0, 1, true))).unwrap(),
            AttemptState::RetakeGranted
        );
        assert_eq!(
            derive_state(2, Some(&permission(1, 1, true))).unwrap(),
            AttemptState::Closed
        );
        assert_eq!(
            derive_state(1, Some(&permission(0, 3, false))).unwrap(),
            AttemptState::Closed
        );
    }
}
