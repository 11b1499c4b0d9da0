//! Integration tests for sagas whose rollback cannot finish.

mod common;

use std::sync::Arc;

use common::{CallLog, ReportData, ScriptedSaga, ScriptedStep, names, stored};
use saga_engine::{CancellationToken, MemorySagaStore, SagaOrchestrator, SagaState, StepStatus};

#[tokio::test]
async fn compensation_failure_stops_rollback() -> anyhow::Result<()> {
    let log = CallLog::default();
    let store = Arc::new(MemorySagaStore::new());
    let definition = ScriptedSaga::new(vec![
        ScriptedStep::new("step_1", &log),
        ScriptedStep::new("step_2", &log),
        ScriptedStep::new("step_3", &log).failing_compensation("archive is read-only"),
        ScriptedStep::new("step_4", &log).failing("mail server down"),
    ]);
    let orchestrator = SagaOrchestrator::new(definition, Arc::clone(&store));

    let handle = orchestrator
        .start_supervised(ReportData::new(9), &CancellationToken::new())
        .await?;
    let id = handle.id();

    assert_eq!(handle.wait().await?, SagaState::CompensationFailed);
    assert_eq!(log.compensated(), names(&["step_3"]));

    let record = stored(&store, id).await;
    assert_eq!(
        record.error_message.as_deref(),
        Some("Failed to compensate step_3: archive is read-only")
    );
    assert_eq!(
        record.steps.get("step_3").map(|s| s.status),
        Some(StepStatus::CompensationFailed)
    );
    assert_eq!(
        record.steps.get("step_2").map(|s| s.status),
        Some(StepStatus::Completed)
    );
    assert_eq!(
        record.steps.get("step_1").map(|s| s.status),
        Some(StepStatus::Completed)
    );
    Ok(())
}

#[tokio::test]
async fn panicking_compensation_is_a_compensation_failure() -> anyhow::Result<()> {
    let log = CallLog::default();
    let store = Arc::new(MemorySagaStore::new());
    let definition = ScriptedSaga::new(vec![
        ScriptedStep::new("step_1", &log),
        ScriptedStep::new("step_2", &log).panicking_compensation("rollback script crashed"),
        ScriptedStep::new("step_3", &log).failing("boom"),
    ]);
    let orchestrator = SagaOrchestrator::new(definition, Arc::clone(&store));

    let handle = orchestrator
        .start_supervised(ReportData::new(9), &CancellationToken::new())
        .await?;
    let id = handle.id();

    assert_eq!(handle.wait().await?, SagaState::CompensationFailed);
    assert_eq!(log.compensated(), names(&["step_2"]));

    let record = stored(&store, id).await;
    let message = record.error_message.unwrap_or_default();
    assert!(message.starts_with("Failed to compensate step_2"), "got: {message}");
    assert!(message.contains("rollback script crashed"), "got: {message}");
    Ok(())
}

#[tokio::test]
async fn compensation_failure_is_terminal() -> anyhow::Result<()> {
    let log = CallLog::default();
    let store = Arc::new(MemorySagaStore::new());
    let definition = ScriptedSaga::new(vec![
        ScriptedStep::new("step_1", &log).failing_compensation("nope"),
        ScriptedStep::new("step_2", &log).failing("boom"),
    ]);
    let orchestrator = SagaOrchestrator::new(definition, Arc::clone(&store));
    let cancel = CancellationToken::new();

    let handle = orchestrator
        .start_supervised(ReportData::new(9), &cancel)
        .await?;
    let id = handle.id();
    handle.wait().await?;

    let err = orchestrator
        .resume(id, &cancel)
        .await
        .expect_err("terminal saga cannot resume");
    assert!(err.to_string().contains("CompensationFailed"));
    assert_eq!(log.compensated(), names(&["step_1"]));
    Ok(())
}
