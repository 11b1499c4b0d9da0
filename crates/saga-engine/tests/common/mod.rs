//! Shared fixtures for the orchestrator integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use saga_engine::{
    CancellationToken, MemorySagaStore, Result, SagaDefinition, SagaId, SagaRecord,
    SagaStep, SagaStore, StepFailure, StepPlan, StepResult, StepsBuilder, StoreError,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

pub const SAGA_TYPE: &str = "MonthlyReport";

/// Payload of the monthly report saga used throughout the tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub internship_id: u32,
    pub year: i32,
    pub month: u32,
    pub total_hours: u32,
    pub generated_report_id: Option<u32>,
    /// Names of the steps whose effects are currently applied.
    pub applied: Vec<String>,
}

impl ReportData {
    pub fn new(internship_id: u32) -> Self {
        Self {
            internship_id,
            year: 2024,
            month: 3,
            ..Self::default()
        }
    }
}

/// Ordered log of every execute/compensate call, shared between steps.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.with_prefix("execute ")
    }

    pub fn compensated(&self) -> Vec<String> {
        self.with_prefix("compensate ")
    }

    fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter_map(|entry| entry.strip_prefix(prefix))
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(String),
    Panic(String),
}

/// A step whose outcome is fixed up front and which logs every call.
#[derive(Clone)]
pub struct ScriptedStep {
    name: String,
    log: CallLog,
    on_execute: Behavior,
    on_compensate: Behavior,
    cancels: Option<CancellationToken>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedStep {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            on_execute: Behavior::Succeed,
            on_compensate: Behavior::Succeed,
            cancels: None,
            gate: None,
        }
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.on_execute = Behavior::Fail(message.to_string());
        self
    }

    pub fn panicking(mut self, message: &str) -> Self {
        self.on_execute = Behavior::Panic(message.to_string());
        self
    }

    pub fn failing_compensation(mut self, message: &str) -> Self {
        self.on_compensate = Behavior::Fail(message.to_string());
        self
    }

    pub fn panicking_compensation(mut self, message: &str) -> Self {
        self.on_compensate = Behavior::Panic(message.to_string());
        self
    }

    /// Cancel `token` while executing, then succeed.
    pub fn cancelling(mut self, token: &CancellationToken) -> Self {
        self.cancels = Some(token.clone());
        self
    }

    /// Block execution until `gate` is notified.
    pub fn gated(mut self, gate: &Arc<Notify>) -> Self {
        self.gate = Some(Arc::clone(gate));
        self
    }
}

fn behave(behavior: &Behavior) -> StepResult {
    match behavior {
        Behavior::Succeed => Ok(()),
        Behavior::Fail(message) => Err(StepFailure::new(message.clone())),
        Behavior::Panic(message) => panic!("{message}"),
    }
}

#[async_trait]
impl SagaStep<ReportData> for ScriptedStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, data: &mut ReportData, _cancel: &CancellationToken) -> StepResult {
        self.log.push(format!("execute {}", self.name));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(token) = &self.cancels {
            token.cancel();
        }
        behave(&self.on_execute)?;
        data.total_hours += 40;
        data.applied.push(self.name.clone());
        Ok(())
    }

    async fn compensate(&self, data: &mut ReportData, cancel: &CancellationToken) -> StepResult {
        assert!(!cancel.is_cancelled(), "compensation must not be cancelled");
        self.log.push(format!("compensate {}", self.name));
        behave(&self.on_compensate)?;
        data.applied.retain(|name| name != &self.name);
        Ok(())
    }
}

/// A saga definition made of scripted steps.
pub struct ScriptedSaga {
    saga_type: String,
    steps: Vec<ScriptedStep>,
}

impl ScriptedSaga {
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self::with_type(SAGA_TYPE, steps)
    }

    pub fn with_type(saga_type: &str, steps: Vec<ScriptedStep>) -> Self {
        Self {
            saga_type: saga_type.to_string(),
            steps,
        }
    }
}

impl SagaDefinition for ScriptedSaga {
    type Data = ReportData;

    fn saga_type(&self) -> &str {
        &self.saga_type
    }

    fn steps(&self) -> Result<StepPlan<ReportData>> {
        let mut steps = self.steps.iter().cloned();
        let first = steps.next().expect("scripted saga needs a step");
        steps
            .fold(StepsBuilder::new().first_step(first), |builder, step| {
                builder.then(step)
            })
            .build()
    }
}

/// Build `n` succeeding steps named `step_1..=step_n`.
pub fn steps(n: usize, log: &CallLog) -> Vec<ScriptedStep> {
    (1..=n)
        .map(|i| ScriptedStep::new(&format!("step_{i}"), log))
        .collect()
}

pub fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

pub async fn stored(store: &MemorySagaStore, id: SagaId) -> SagaRecord {
    store
        .get_by_id(id, &CancellationToken::new())
        .await
        .expect("store read")
        .expect("saga stored")
}

/// Poll the store until the saga reaches a terminal state.
pub async fn wait_for_terminal(store: &MemorySagaStore, id: SagaId) -> SagaRecord {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let record = stored(store, id).await;
            if record.state.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("saga did not finish in time")
}

/// Store whose updates start failing after a number of successful ones.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemorySagaStore,
    healthy_updates: AtomicUsize,
    panic_instead: bool,
}

impl FlakyStore {
    pub fn failing_after(healthy_updates: usize) -> Self {
        Self {
            inner: MemorySagaStore::new(),
            healthy_updates: AtomicUsize::new(healthy_updates),
            panic_instead: false,
        }
    }

    /// Panics on the first update after `healthy_updates`, then recovers.
    pub fn panicking_after(healthy_updates: usize) -> Self {
        Self {
            panic_instead: true,
            ..Self::failing_after(healthy_updates)
        }
    }
}

#[async_trait]
impl SagaStore for FlakyStore {
    async fn get_by_id(
        &self,
        id: SagaId,
        cancel: &CancellationToken,
    ) -> std::result::Result<Option<SagaRecord>, StoreError> {
        self.inner.get_by_id(id, cancel).await
    }

    async fn save(
        &self,
        record: &SagaRecord,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), StoreError> {
        self.inner.save(record, cancel).await
    }

    async fn update(
        &self,
        record: &SagaRecord,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), StoreError> {
        let healthy = self
            .healthy_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if healthy {
            return self.inner.update(record, cancel).await;
        }
        if self.panic_instead {
            self.healthy_updates.store(usize::MAX, Ordering::SeqCst);
            panic!("disk on fire");
        }
        Err(StoreError::backend(std::io::Error::other("disk full")))
    }

    async fn exists(
        &self,
        id: SagaId,
        cancel: &CancellationToken,
    ) -> std::result::Result<bool, StoreError> {
        self.inner.exists(id, cancel).await
    }

    async fn list(
        &self,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<SagaRecord>, StoreError> {
        self.inner.list(cancel).await
    }
}
