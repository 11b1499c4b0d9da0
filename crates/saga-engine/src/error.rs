use thiserror::Error;

use crate::id::SagaId;
use crate::state::SagaState;

/// Expected business failure reported by a step.
///
/// Returned from [`SagaStep::execute`](crate::SagaStep::execute) or
/// [`SagaStep::compensate`](crate::SagaStep::compensate); never used for faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StepFailure {
    message: String,
}

impl StepFailure {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Error from a [`SagaStore`](crate::SagaStore) implementation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// `update` was called for a saga that was never saved.
    #[error("saga {0} not found in store")]
    NotFound(SagaId),

    /// `save` was called for a saga that is already stored.
    #[error("saga {0} already exists in store")]
    AlreadyExists(SagaId),

    /// The operation was abandoned because its cancellation token fired.
    #[error("store operation cancelled")]
    Cancelled,

    /// Storage backend failure.
    #[error("store backend error")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(error))
    }
}

/// Error from saga construction, state transitions and orchestration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SagaError {
    /// Two steps in one plan share a name.
    #[error("duplicate step name '{0}' in saga plan")]
    DuplicateStep(String),

    /// A lifecycle mutator was called from a state it does not accept.
    #[error("invalid saga transition from {from} to {to}")]
    InvalidTransition {
        /// State the saga was in.
        from: SagaState,
        /// State the caller tried to enter.
        to: SagaState,
    },

    #[error("saga {0} not found")]
    NotFound(SagaId),

    /// Resume was requested for a saga that already finished.
    #[error("cannot resume saga {id} in state {state}")]
    Terminal {
        id: SagaId,
        state: SagaState,
    },

    /// The stored saga belongs to a different definition.
    #[error("saga {id} has type '{found}', expected '{expected}'")]
    TypeMismatch {
        id: SagaId,
        expected: String,
        found: String,
    },

    /// Another run of the same saga is active in this process.
    #[error("saga {0} is already running")]
    AlreadyRunning(SagaId),

    /// The run's task was aborted before it reported a final state.
    #[error("saga {0} run was aborted")]
    Aborted(SagaId),

    /// The stored record does not match the saga's step plan.
    #[error("stored saga {id} is inconsistent: {reason}")]
    CorruptRecord {
        id: SagaId,
        reason: String,
    },

    /// Saga data did not serialize to a string-keyed map.
    #[error("saga data must serialize to a JSON object")]
    DataNotAMap,

    #[error("saga data could not be (de)serialized")]
    Data(#[from] serde_json::Error),

    #[error("saga store failed")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SagaError>;

/// Render an error with its `source` chain, `outer: inner: root`.
pub(crate) fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_failure_displays_its_message() {
        let failure = StepFailure::new("not enough hours: 120/160");

        assert_eq!(failure.to_string(), "not enough hours: 120/160");
        assert_eq!(failure.message(), "not enough hours: 120/160");
    }

    #[test]
    fn store_error_converts_via_from() {
        let err: SagaError = StoreError::Cancelled.into();

        assert!(matches!(err, SagaError::Store(StoreError::Cancelled)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn terminal_error_names_state() {
        let err = SagaError::Terminal {
            id: SagaId::new(),
            state: SagaState::CompensationFailed,
        };

        assert!(err.to_string().contains("CompensationFailed"));
    }

    #[test]
    fn error_chain_joins_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: SagaError = StoreError::backend(io).into();

        assert_eq!(
            error_chain(&err),
            "saga store failed: store backend error: denied"
        );
    }

    #[test]
    fn backend_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");

        let err = StoreError::backend(io);

        let source = std::error::Error::source(&err).expect("has source");
        assert_eq!(source.to_string(), "denied");
    }
}
