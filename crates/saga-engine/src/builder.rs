use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{Result, SagaError};
use crate::step::SagaStep;

/// Marker type for a builder with no steps.
pub struct Empty;

/// Marker type for a builder with at least one step.
pub struct HasSteps;

/// Type-state builder for a saga's ordered step list.
///
/// A plan always has at least one step:
///
/// ```compile_fail
/// use saga_engine::StepsBuilder;
///
/// // `build()` is only available after `first_step()`
/// let plan = StepsBuilder::<u32, _>::new().build();
/// ```
pub struct StepsBuilder<D: Send, State> {
    steps: Vec<Arc<dyn SagaStep<D>>>,
    _state: PhantomData<State>,
}

impl<D: Send> StepsBuilder<D, Empty> {
    /// Create a new builder in the empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            _state: PhantomData,
        }
    }

    /// Add the first step.
    #[must_use]
    pub fn first_step<S>(self, step: S) -> StepsBuilder<D, HasSteps>
    where
        S: SagaStep<D> + 'static,
    {
        let mut steps = self.steps;
        steps.push(Arc::new(step));
        StepsBuilder {
            steps,
            _state: PhantomData,
        }
    }
}

impl<D: Send> Default for StepsBuilder<D, Empty> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Send> StepsBuilder<D, HasSteps> {
    /// Append another step; it runs after every step added before it.
    #[must_use]
    pub fn then<S>(mut self, step: S) -> Self
    where
        S: SagaStep<D> + 'static,
    {
        self.steps.push(Arc::new(step));
        self
    }

    /// Build the plan from the accumulated steps.
    ///
    /// # Errors
    ///
    /// Returns [`SagaError::DuplicateStep`] if two steps share a name.
    pub fn build(self) -> Result<StepPlan<D>> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name()) {
                return Err(SagaError::DuplicateStep(step.name().to_string()));
            }
        }
        Ok(StepPlan {
            steps: self.steps.into(),
        })
    }
}

/// Ordered, immutable list of a saga's steps with unique names.
pub struct StepPlan<D: Send> {
    steps: Arc<[Arc<dyn SagaStep<D>>]>,
}

impl<D: Send> Clone for StepPlan<D> {
    fn clone(&self) -> Self {
        Self {
            steps: Arc::clone(&self.steps),
        }
    }
}

impl<D: Send> StepPlan<D> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arc<dyn SagaStep<D>>> {
        self.steps.get(index)
    }

    /// Position of the step with the given name.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|step| step.name())
    }
}

impl<D> std::fmt::Debug for StepPlan<D>
where
    D: Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::step::StepResult;

    struct Named(&'static str);

    #[async_trait]
    impl SagaStep<()> for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(&self, _data: &mut (), _cancel: &CancellationToken) -> StepResult {
            Ok(())
        }
    }

    #[test]
    fn builder_creates_single_step_plan() -> anyhow::Result<()> {
        let plan = StepsBuilder::new().first_step(Named("only")).build()?;

        assert_eq!(plan.len(), 1);
        assert_eq!(plan.names().collect::<Vec<_>>(), vec!["only"]);
        Ok(())
    }

    #[test]
    fn builder_keeps_definition_order() -> anyhow::Result<()> {
        let plan = StepsBuilder::new()
            .first_step(Named("validate"))
            .then(Named("generate"))
            .then(Named("notify"))
            .build()?;

        assert_eq!(
            plan.names().collect::<Vec<_>>(),
            vec!["validate", "generate", "notify"]
        );
        assert_eq!(plan.position("notify"), Some(2));
        assert_eq!(plan.position("archive"), None);
        Ok(())
    }

    #[test]
    fn builder_rejects_duplicate_names() {
        let result = StepsBuilder::new()
            .first_step(Named("validate"))
            .then(Named("generate"))
            .then(Named("validate"))
            .build();

        let err = result.expect_err("duplicate should be rejected");
        assert!(matches!(err, SagaError::DuplicateStep(name) if name == "validate"));
    }

    #[test]
    fn cloned_plans_share_steps() -> anyhow::Result<()> {
        let plan = StepsBuilder::new().first_step(Named("a")).build()?;

        let clone = plan.clone();

        assert!(Arc::ptr_eq(
            plan.get(0).expect("step"),
            clone.get(0).expect("step")
        ));
        Ok(())
    }
}
