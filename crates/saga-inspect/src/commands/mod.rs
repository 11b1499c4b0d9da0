mod list;
mod show;

use clap::Subcommand;
use saga_engine::{SagaId, SagaState};
use saga_store_fs::FsSagaStore;

use crate::error::Result;

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// List stored sagas, oldest first
    List {
        /// Only show sagas in this state (e.g. CompensationFailed)
        #[arg(long)]
        state: Option<SagaState>,

        /// Only show sagas that have not reached a terminal state
        #[arg(long, conflicts_with = "state")]
        incomplete: bool,
    },
    /// Show one saga with its step history and data
    Show {
        /// Saga id
        id: SagaId,
    },
}

impl Commands {
    pub(crate) async fn execute(self, store: &FsSagaStore) -> Result<()> {
        match self {
            Self::List { state, incomplete } => list::run(store, state, incomplete).await,
            Self::Show { id } => show::run(store, id).await,
        }
    }
}
