use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::id::SagaId;
use crate::record::SagaRecord;

/// Persistence for saga records.
///
/// The store is the only resource shared between concurrent saga runs and is
/// responsible for its own concurrency control. Implementations should return
/// [`StoreError::Cancelled`] when handed a token that is already cancelled.
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Load a saga. Returns `Ok(None)` if it was never saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the token is cancelled.
    async fn get_by_id(
        &self,
        id: SagaId,
        cancel: &CancellationToken,
    ) -> Result<Option<SagaRecord>, StoreError>;

    /// Insert a new saga.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if the id is taken.
    async fn save(&self, record: &SagaRecord, cancel: &CancellationToken)
    -> Result<(), StoreError>;

    /// Replace an existing saga.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the saga was never saved.
    async fn update(
        &self,
        record: &SagaRecord,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns an error if the backend fails or the token is cancelled.
    async fn exists(&self, id: SagaId, cancel: &CancellationToken) -> Result<bool, StoreError>;

    /// All stored sagas, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the token is cancelled.
    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<SagaRecord>, StoreError>;

    /// Stored sagas that have not reached a terminal state, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the token is cancelled.
    async fn find_incomplete(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<SagaRecord>, StoreError> {
        let mut records = self.list(cancel).await?;
        records.retain(|record| !record.state.is_terminal());
        Ok(records)
    }
}

/// In-memory [`SagaStore`]; records live as long as the store.
#[derive(Debug, Default)]
pub struct MemorySagaStore {
    records: RwLock<HashMap<SagaId, SagaRecord>>,
}

impl MemorySagaStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), StoreError> {
    if cancel.is_cancelled() {
        Err(StoreError::Cancelled)
    } else {
        Ok(())
    }
}

#[async_trait]
impl SagaStore for MemorySagaStore {
    async fn get_by_id(
        &self,
        id: SagaId,
        cancel: &CancellationToken,
    ) -> Result<Option<SagaRecord>, StoreError> {
        ensure_live(cancel)?;
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn save(
        &self,
        record: &SagaRecord,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        ensure_live(cancel)?;
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn update(
        &self,
        record: &SagaRecord,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        ensure_live(cancel)?;
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(record.id)),
        }
    }

    async fn exists(&self, id: SagaId, cancel: &CancellationToken) -> Result<bool, StoreError> {
        ensure_live(cancel)?;
        Ok(self.records.read().await.contains_key(&id))
    }

    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<SagaRecord>, StoreError> {
        ensure_live(cancel)?;
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }
}
