use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a saga instance.
///
/// Persisted as text (`"InProgress"`, `"CompensationFailed"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaState {
    /// Created and persisted, no step has completed yet.
    Started,
    /// At least one step completed, more remain.
    InProgress,
    /// A step failed and completed steps are being undone.
    Compensating,
    /// Every step completed.
    Completed,
    /// The run stopped without completing; also the state a cancelled run ends in.
    Failed,
    /// Every completed step was undone after a failure.
    Compensated,
    /// An undo failed; needs operator attention.
    CompensationFailed,
}

impl SagaState {
    pub const ALL: [SagaState; 7] = [
        SagaState::Started,
        SagaState::InProgress,
        SagaState::Compensating,
        SagaState::Completed,
        SagaState::Failed,
        SagaState::Compensated,
        SagaState::CompensationFailed,
    ];

    /// Whether no further transition can happen from this state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Compensated | Self::CompensationFailed
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "Started",
            Self::InProgress => "InProgress",
            Self::Compensating => "Compensating",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Compensated => "Compensated",
            Self::CompensationFailed => "CompensationFailed",
        }
    }
}

impl fmt::Display for SagaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown saga state '{0}'")]
pub struct ParseSagaStateError(String);

impl FromStr for SagaState {
    type Err = ParseSagaStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseSagaStateError(s.to_string()))
    }
}
