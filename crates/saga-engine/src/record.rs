use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::SagaId;
use crate::state::SagaState;

/// Status of a step in the execution history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum StepStatus {
    /// Step started executing and has not finished.
    Running,
    /// Step executed successfully.
    Completed,
    /// Step failed during execution.
    Failed,
    /// Step was compensated successfully.
    Compensated,
    /// Step compensation failed.
    CompensationFailed,
}

/// Record of a step's execution in the saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Name of the step.
    pub name: String,
    /// Current status.
    pub status: StepStatus,
    /// When the step started executing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the step completed (execution or compensation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure reason, for `Failed` and `CompensationFailed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Ordered execution history of a saga's steps, one record per step name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepHistory {
    records: Vec<StepRecord>,
}

impl StepHistory {
    /// Create a new empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step starting. A step run again after a resume reuses its record.
    pub(crate) fn record_start(&mut self, name: &str) {
        let now = Utc::now();
        match self.find_mut(name) {
            Some(record) => {
                record.status = StepStatus::Running;
                record.started_at = Some(now);
                record.completed_at = None;
                record.error_message = None;
            }
            None => self.records.push(StepRecord {
                name: name.to_string(),
                status: StepStatus::Running,
                started_at: Some(now),
                completed_at: None,
                error_message: None,
            }),
        }
    }

    pub(crate) fn record_success(&mut self, name: &str) {
        self.finish(name, StepStatus::Completed, None);
    }

    pub(crate) fn record_failure(&mut self, name: &str, message: &str) {
        self.finish(name, StepStatus::Failed, Some(message));
    }

    pub(crate) fn record_compensated(&mut self, name: &str) {
        self.finish(name, StepStatus::Compensated, None);
    }

    pub(crate) fn record_compensation_failed(&mut self, name: &str, message: &str) {
        self.finish(name, StepStatus::CompensationFailed, Some(message));
    }

    fn finish(&mut self, name: &str, status: StepStatus, message: Option<&str>) {
        let now = Utc::now();
        let error_message = message.map(str::to_string);
        match self.find_mut(name) {
            Some(record) => {
                record.status = status;
                record.completed_at = Some(now);
                record.error_message = error_message;
            }
            None => self.records.push(StepRecord {
                name: name.to_string(),
                status,
                started_at: None,
                completed_at: Some(now),
                error_message,
            }),
        }
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut StepRecord> {
        self.records.iter_mut().find(|record| record.name == name)
    }

    /// Get all records in the history.
    #[must_use]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StepRecord> {
        self.records.iter().find(|record| record.name == name)
    }

    /// Get a summary of the saga execution for display.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for record in &self.records {
            let status = match record.status {
                StepStatus::Running => "…",
                StepStatus::Completed => "✓",
                StepStatus::Failed => "✗",
                StepStatus::Compensated => "↩",
                StepStatus::CompensationFailed => "⚠",
            };
            match &record.error_message {
                Some(message) => lines.push(format!("{status} {}: {message}", record.name)),
                None => lines.push(format!("{status} {}", record.name)),
            }
        }
        lines.join("\n")
    }
}

/// Persisted shape of a saga: the only place its state leaves memory.
///
/// `data` is kept opaque here; the store never interprets the business payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaRecord {
    pub id: SagaId,
    #[serde(rename = "type")]
    pub saga_type: String,
    pub state: SagaState,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub steps: StepHistory,
}

impl SagaRecord {
    /// Step history rendered one line per step.
    #[must_use]
    pub fn summary(&self) -> String {
        self.steps.summary()
    }
}
