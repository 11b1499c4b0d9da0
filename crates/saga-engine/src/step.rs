use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::StepFailure;

/// Outcome of a step's forward or compensating action.
pub type StepResult = Result<(), StepFailure>;

/// A step in a saga that can be executed and compensated.
///
/// Steps of one saga share a mutable data bag `D` that they read and update;
/// the orchestrator never touches it. Expected business failures are returned
/// as [`StepFailure`]. A panic is treated as an unexpected fault and handled
/// the same way as a failure.
///
/// The engine offers at-least-once compensation and no automatic idempotency:
/// a step must be safe to compensate even if its `execute` only partially
/// applied, and safe to execute again when a saga is resumed after a crash.
#[async_trait]
pub trait SagaStep<D>: Send + Sync
where
    D: Send,
{
    /// Stable name, unique within one saga. Used for logging and history.
    fn name(&self) -> &str;

    /// Execute the step.
    ///
    /// The cancellation token is informational; the orchestrator only checks
    /// it between steps.
    ///
    /// # Errors
    ///
    /// Returns a [`StepFailure`] when the step cannot complete.
    async fn execute(&self, data: &mut D, cancel: &CancellationToken) -> StepResult;

    /// Compensate (undo) the step's effects.
    ///
    /// Called during rollback when a later step fails. The default
    /// implementation is a no-op, suitable for read-only steps.
    ///
    /// # Errors
    ///
    /// Returns a [`StepFailure`] when the undo cannot be performed.
    async fn compensate(&self, data: &mut D, cancel: &CancellationToken) -> StepResult {
        let _ = (data, cancel);
        Ok(())
    }

    /// Human-readable description of what compensation will do.
    fn compensation_description(&self) -> String {
        format!("undo {}", self.name())
    }
}
