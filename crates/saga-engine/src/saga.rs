use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::builder::StepPlan;
use crate::error::{Result, SagaError};
use crate::id::SagaId;
use crate::record::{SagaRecord, StepHistory, StepStatus};
use crate::state::SagaState;
use crate::step::SagaStep;

/// A running saga: identity, lifecycle state, payload and step progress.
///
/// The lifecycle state only changes through the named transition methods
/// (`record_step_execution`, `mark_completed`, `mark_failed`,
/// `start_compensation`, `mark_compensated`, `mark_compensation_failed`).
/// Each one checks the current state and returns
/// [`SagaError::InvalidTransition`] without changing anything when the
/// transition is not allowed.
///
/// Completed steps are kept on a stack in execution order; compensation pops
/// it, so steps are undone in reverse (LIFO).
pub struct SagaInstance<D: Send> {
    id: SagaId,
    saga_type: String,
    state: SagaState,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    data: D,
    plan: StepPlan<D>,
    executed: Vec<usize>,
    history: StepHistory,
}

impl<D> SagaInstance<D>
where
    D: Serialize + DeserializeOwned + Send,
{
    /// Create a fresh saga in the `Started` state.
    #[must_use]
    pub fn new(saga_type: impl Into<String>, plan: StepPlan<D>, data: D) -> Self {
        Self {
            id: SagaId::new(),
            saga_type: saga_type.into(),
            state: SagaState::Started,
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
            data,
            plan,
            executed: Vec::new(),
            history: StepHistory::new(),
        }
    }

    /// Rebuild a saga from its persisted record and a freshly built plan.
    ///
    /// The executed stack is rebuilt from the leading run of `Completed` step
    /// records, which must match the start of the plan.
    ///
    /// # Errors
    ///
    /// Returns [`SagaError::CorruptRecord`] if the history names unknown steps
    /// or completed steps out of plan order, and [`SagaError::Data`] if the
    /// payload does not deserialize into `D`.
    pub fn restore(record: SagaRecord, plan: StepPlan<D>) -> Result<Self> {
        let id = record.id;
        let corrupt = |reason: String| SagaError::CorruptRecord { id, reason };

        for step in record.steps.records() {
            if plan.position(&step.name).is_none() {
                return Err(corrupt(format!("unknown step '{}'", step.name)));
            }
        }

        let is_completed = |index: usize| {
            plan.get(index)
                .and_then(|step| record.steps.get(step.name()))
                .is_some_and(|r| r.status == StepStatus::Completed)
        };
        let executed: Vec<usize> = (0..plan.len()).take_while(|&i| is_completed(i)).collect();
        if let Some(stray) = (executed.len()..plan.len()).find(|&i| is_completed(i)) {
            let name = plan.get(stray).map_or("?", |step| step.name());
            return Err(corrupt(format!(
                "step '{name}' is completed but an earlier step is not"
            )));
        }

        let data = serde_json::from_value(Value::Object(record.data))?;

        Ok(Self {
            id,
            saga_type: record.saga_type,
            state: record.state,
            created_at: record.created_at,
            completed_at: record.completed_at,
            error_message: record.error_message,
            data,
            plan,
            executed,
            history: record.steps,
        })
    }

    /// Snapshot the saga into its persisted shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload fails to serialize or is not a map.
    pub fn to_record(&self) -> Result<SagaRecord> {
        let Value::Object(data) = serde_json::to_value(&self.data)? else {
            return Err(SagaError::DataNotAMap);
        };
        Ok(SagaRecord {
            id: self.id,
            saga_type: self.saga_type.clone(),
            state: self.state,
            created_at: self.created_at,
            completed_at: self.completed_at,
            error_message: self.error_message.clone(),
            data,
            steps: self.history.clone(),
        })
    }
}

impl<D: Send> SagaInstance<D> {
    #[must_use]
    pub fn id(&self) -> SagaId {
        self.id
    }

    #[must_use]
    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    #[must_use]
    pub fn state(&self) -> SagaState {
        self.state
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    #[must_use]
    pub fn data(&self) -> &D {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut D {
        &mut self.data
    }

    #[must_use]
    pub fn history(&self) -> &StepHistory {
        &self.history
    }

    /// Names of the steps on the compensation stack, in execution order.
    #[must_use]
    pub fn executed_steps(&self) -> Vec<&str> {
        self.executed
            .iter()
            .filter_map(|&index| self.plan.get(index))
            .map(|step| step.name())
            .collect()
    }

    /// The first step that has not completed yet.
    #[must_use]
    pub fn next_step(&self) -> Option<Arc<dyn SagaStep<D>>> {
        self.plan.get(self.executed.len()).cloned()
    }

    /// The step compensation would undo next.
    #[must_use]
    pub fn next_compensation(&self) -> Option<Arc<dyn SagaStep<D>>> {
        self.executed
            .last()
            .and_then(|&index| self.plan.get(index))
            .cloned()
    }

    /// Note in the history that the next step started.
    pub(crate) fn begin_next_step(&mut self) {
        if let Some(step) = self.plan.get(self.executed.len()) {
            self.history.record_start(step.name());
        }
    }

    /// Note in the history that the next step failed. Does not change state.
    pub(crate) fn record_step_failure(&mut self, message: &str) {
        if let Some(step) = self.plan.get(self.executed.len()) {
            self.history.record_failure(step.name(), message);
        }
    }

    /// Push the next step onto the executed stack and enter `InProgress`.
    ///
    /// # Errors
    ///
    /// Fails outside `Started`/`InProgress`, or when every step already ran.
    pub fn record_step_execution(&mut self) -> Result<()> {
        self.check(&[SagaState::Started, SagaState::InProgress], SagaState::InProgress)?;
        let index = self.executed.len();
        let Some(step) = self.plan.get(index) else {
            return Err(self.invalid(SagaState::InProgress));
        };
        self.history.record_success(step.name());
        self.executed.push(index);
        self.state = SagaState::InProgress;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails unless the saga is `InProgress`.
    pub fn mark_completed(&mut self) -> Result<()> {
        self.check(&[SagaState::InProgress], SagaState::Completed)?;
        self.state = SagaState::Completed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// # Errors
    ///
    /// Fails unless the saga is `Started` or `InProgress`.
    pub fn mark_failed(&mut self, message: impl Into<String>) -> Result<()> {
        self.check(&[SagaState::Started, SagaState::InProgress], SagaState::Failed)?;
        self.state = SagaState::Failed;
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// # Errors
    ///
    /// Fails unless the saga is `Failed`.
    pub fn start_compensation(&mut self) -> Result<()> {
        self.check(&[SagaState::Failed], SagaState::Compensating)?;
        self.state = SagaState::Compensating;
        self.completed_at = None;
        Ok(())
    }

    /// Pop the top of the executed stack after its compensation succeeded.
    pub(crate) fn record_step_compensated(&mut self) {
        if let Some(step) = self.executed.pop().and_then(|index| self.plan.get(index)) {
            self.history.record_compensated(step.name());
        }
    }

    /// Note in the history that compensating the top of the stack failed.
    pub(crate) fn record_compensation_failure(&mut self, message: &str) {
        if let Some(step) = self.executed.last().and_then(|&index| self.plan.get(index)) {
            self.history.record_compensation_failed(step.name(), message);
        }
    }

    /// Every executed step was undone.
    ///
    /// # Errors
    ///
    /// Fails unless the saga is `Compensating`.
    pub fn mark_compensated(&mut self) -> Result<()> {
        self.check(&[SagaState::Compensating], SagaState::Compensated)?;
        self.state = SagaState::Compensated;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// # Errors
    ///
    /// Fails unless the saga is `Compensating`.
    pub fn mark_compensation_failed(&mut self, message: impl Into<String>) -> Result<()> {
        self.check(&[SagaState::Compensating], SagaState::CompensationFailed)?;
        self.state = SagaState::CompensationFailed;
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn check(&self, allowed: &[SagaState], to: SagaState) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.invalid(to))
        }
    }

    fn invalid(&self, to: SagaState) -> SagaError {
        SagaError::InvalidTransition {
            from: self.state,
            to,
        }
    }
}
