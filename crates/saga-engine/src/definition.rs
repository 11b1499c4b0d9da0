use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::builder::StepPlan;
use crate::error::Result;

/// A kind of saga: its type name, payload type and ordered steps.
///
/// The definition is handed to the orchestrator and acts as its step factory:
/// [`steps`](Self::steps) is called once per run, so a definition holding
/// shared services can give every step the dependencies it needs when it
/// builds the plan.
pub trait SagaDefinition: Send + Sync + 'static {
    /// Business payload shared by the steps. Must serialize to a JSON object.
    type Data: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Discriminator persisted with every saga of this kind.
    fn saga_type(&self) -> &str;

    /// Build the ordered step plan for one run.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan is invalid (e.g. duplicate step names).
    fn steps(&self) -> Result<StepPlan<Self::Data>>;
}
