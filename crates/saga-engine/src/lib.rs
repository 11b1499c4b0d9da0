//! Saga orchestration for long-running, multi-step business processes.
//!
//! A saga is an ordered list of steps over a shared data bag. The
//! [`SagaOrchestrator`] persists the saga, runs the steps in order on a
//! detached task and, when a step fails, compensates the completed steps in
//! reverse order. Progress is stored after every step so a saga can be
//! inspected or resumed later through its [`SagaStore`].

mod builder;
mod config;
mod definition;
mod error;
mod id;
mod locks;
mod orchestrator;
mod record;
mod saga;
mod state;
mod step;
mod store;

pub use builder::{Empty, HasSteps, StepPlan, StepsBuilder};
pub use config::OrchestratorConfig;
pub use definition::SagaDefinition;
pub use error::{Result, SagaError, StepFailure, StoreError};
pub use id::SagaId;
pub use locks::{SagaGuard, SagaLocks};
pub use orchestrator::{SagaHandle, SagaOrchestrator};
pub use record::{SagaRecord, StepHistory, StepRecord, StepStatus};
pub use saga::SagaInstance;
pub use state::{ParseSagaStateError, SagaState};
pub use step::{SagaStep, StepResult};
pub use store::{MemorySagaStore, SagaStore};

/// Re-exported so step and store implementations name the same token type.
pub use tokio_util::sync::CancellationToken;
