//! Saga status state machine.

use serde::{Deserialize, Serialize};

/// The status of a saga transaction in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► InProgress ──┬──► Completed
///                          └──► Compensating ──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    /// Transaction created, no step started yet.
    #[default]
    Pending,

    /// Saga steps are being executed.
    InProgress,

    /// A step failed and compensating actions are in progress.
    Compensating,

    /// All steps completed successfully (terminal state).
    Completed,

    /// Compensation finished after a failure (terminal state).
    Failed,
}

impl SagaStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStatus::Completed | SagaStatus::Failed)
    }

    /// Returns true if moving from `self` to `next` follows the lifecycle.
    pub fn can_transition_to(&self, next: SagaStatus) -> bool {
        matches!(
            (self, next),
            (SagaStatus::Pending, SagaStatus::InProgress)
                | (SagaStatus::InProgress, SagaStatus::Completed)
                | (SagaStatus::InProgress, SagaStatus::Compensating)
                | (SagaStatus::Compensating, SagaStatus::Failed)
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Pending => "pending",
            SagaStatus::InProgress => "in_progress",
            SagaStatus::Compensating => "compensating",
            SagaStatus::Completed => "completed",
            SagaStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SagaStatus; 5] = [
        SagaStatus::Pending,
        SagaStatus::InProgress,
        SagaStatus::Compensating,
        SagaStatus::Completed,
        SagaStatus::Failed,
    ];

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(SagaStatus::default(), SagaStatus::Pending);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SagaStatus::Pending.is_terminal());
        assert!(!SagaStatus::InProgress.is_terminal());
        assert!(!SagaStatus::Compensating.is_terminal());
        assert!(SagaStatus::Completed.is_terminal());
        assert!(SagaStatus::Failed.is_terminal());
    }

    #[test]
    fn test_transitions() {
        let allowed: Vec<_> = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();

        assert_eq!(
            allowed,
            vec![
                (SagaStatus::Pending, SagaStatus::InProgress),
                (SagaStatus::InProgress, SagaStatus::Compensating),
                (SagaStatus::InProgress, SagaStatus::Completed),
                (SagaStatus::Compensating, SagaStatus::Failed),
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(SagaStatus::Pending.to_string(), "pending");
        assert_eq!(SagaStatus::InProgress.to_string(), "in_progress");
        assert_eq!(SagaStatus::Compensating.to_string(), "compensating");
        assert_eq!(SagaStatus::Completed.to_string(), "completed");
        assert_eq!(SagaStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&SagaStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let deserialized: SagaStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, SagaStatus::InProgress);
    }
}
