use saga_engine::{CancellationToken, SagaRecord, SagaState, SagaStore};
use saga_store_fs::FsSagaStore;

use crate::error::Result;

pub(crate) async fn run(
    store: &FsSagaStore,
    state: Option<SagaState>,
    incomplete: bool,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let mut records = if incomplete {
        store.find_incomplete(&cancel).await?
    } else {
        store.list(&cancel).await?
    };
    if let Some(state) = state {
        records.retain(|record| record.state == state);
    }

    print_records(&records);
    Ok(())
}

fn print_records(records: &[SagaRecord]) {
    if records.is_empty() {
        println!("No sagas found.");
        return;
    }

    for record in records {
        println!("{}", format_row(record));
    }

    let stuck = records
        .iter()
        .filter(|record| record.state == SagaState::CompensationFailed)
        .count();
    if stuck > 0 {
        println!();
        println!("{stuck} saga(s) in CompensationFailed need manual attention.");
    }
}

fn format_row(record: &SagaRecord) -> String {
    format!(
        "{}  {:<18}  {:<24}  {}",
        record.id,
        record.state.as_str(),
        record.saga_type,
        record.created_at.format("%Y-%m-%d %H:%M:%S")
    )
}
