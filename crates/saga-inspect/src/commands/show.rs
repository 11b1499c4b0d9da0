use std::fmt::Write as _;

use saga_engine::{CancellationToken, SagaId, SagaRecord, SagaStore};
use saga_store_fs::FsSagaStore;

use crate::error::{CliError, Result};

pub(crate) async fn run(store: &FsSagaStore, id: SagaId) -> Result<()> {
    let record = store
        .get_by_id(id, &CancellationToken::new())
        .await?
        .ok_or(CliError::SagaNotFound(id))?;

    print!("{}", render(&record)?);
    Ok(())
}

fn render(record: &SagaRecord) -> Result<String> {
    let mut out = String::new();
    let _ = writeln!(out, "Saga:      {}", record.id);
    let _ = writeln!(out, "Type:      {}", record.saga_type);
    let _ = writeln!(out, "State:     {}", record.state);
    let _ = writeln!(out, "Created:   {}", record.created_at.to_rfc3339());
    if let Some(completed_at) = record.completed_at {
        let _ = writeln!(out, "Finished:  {}", completed_at.to_rfc3339());
    }
    if let Some(message) = &record.error_message {
        let _ = writeln!(out, "Error:     {message}");
    }

    let _ = writeln!(out);
    if record.steps.records().is_empty() {
        let _ = writeln!(out, "Steps: none recorded");
    } else {
        let _ = writeln!(out, "Steps:");
        for line in record.summary().lines() {
            let _ = writeln!(out, "  {line}");
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Data:");
    let _ = writeln!(out, "{}", serde_json::to_string_pretty(&record.data)?);
    Ok(out)
}
