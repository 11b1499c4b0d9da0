use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use saga_engine::{CancellationToken, SagaId, SagaRecord, SagaStore, StoreError};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::FsStoreError;

const RECORD_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "json.tmp";

/// [`SagaStore`] keeping each saga in `<dir>/<id>.json`.
///
/// Writes go to a temporary file that is synced to disk and then renamed over
/// the record, so readers never see a half-written document. Writes within one store are serialized;
/// two stores over the same directory are not coordinated.
#[derive(Debug)]
pub struct FsSagaStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FsSagaStore {
    /// Use `dir` as the store without touching the filesystem.
    ///
    /// A missing directory reads as an empty store; the first write fails.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Create `dir` if needed and use it as the store.
    ///
    /// # Errors
    ///
    /// Returns [`FsStoreError::CreateDir`] if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, FsStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| FsStoreError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        Ok(Self::new(dir))
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document holding saga `id`.
    #[must_use]
    pub fn record_path(&self, id: SagaId) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    async fn write(&self, record: &SagaRecord) -> Result<(), FsStoreError> {
        let path = self.record_path(record.id);
        let content =
            serde_json::to_vec_pretty(record).map_err(|source| FsStoreError::Serialize {
                path: path.clone(),
                source,
            })?;

        let temp = path.with_extension(TEMP_EXTENSION);
        if let Err(source) = write_synced(&temp, &content).await {
            discard_temp(&temp).await;
            return Err(FsStoreError::Write { path: temp, source });
        }
        if let Err(source) = fs::rename(&temp, &path).await {
            discard_temp(&temp).await;
            return Err(FsStoreError::Write { path, source });
        }

        debug!(path = %path.display(), state = %record.state, "wrote saga file");
        Ok(())
    }
}

/// Write `content` to `path` and flush it to disk.
async fn write_synced(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(content).await?;
    file.sync_all().await
}

async fn discard_temp(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove temporary saga file"),
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), StoreError> {
    if cancel.is_cancelled() {
        Err(StoreError::Cancelled)
    } else {
        Ok(())
    }
}

async fn read_record(path: &Path) -> Result<Option<SagaRecord>, FsStoreError> {
    let content = match fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(FsStoreError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let record = serde_json::from_slice(&content).map_err(|source| FsStoreError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(record))
}

async fn file_exists(path: &Path) -> Result<bool, FsStoreError> {
    fs::try_exists(path)
        .await
        .map_err(|source| FsStoreError::Read {
            path: path.to_path_buf(),
            source,
        })
}

fn is_record_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == RECORD_EXTENSION)
}

#[async_trait]
impl SagaStore for FsSagaStore {
    async fn get_by_id(
        &self,
        id: SagaId,
        cancel: &CancellationToken,
    ) -> Result<Option<SagaRecord>, StoreError> {
        ensure_live(cancel)?;
        Ok(read_record(&self.record_path(id)).await?)
    }

    async fn save(
        &self,
        record: &SagaRecord,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        ensure_live(cancel)?;
        let _guard = self.write_lock.lock().await;
        if file_exists(&self.record_path(record.id)).await? {
            return Err(StoreError::AlreadyExists(record.id));
        }
        Ok(self.write(record).await?)
    }

    async fn update(
        &self,
        record: &SagaRecord,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        ensure_live(cancel)?;
        let _guard = self.write_lock.lock().await;
        if !file_exists(&self.record_path(record.id)).await? {
            return Err(StoreError::NotFound(record.id));
        }
        Ok(self.write(record).await?)
    }

    async fn exists(&self, id: SagaId, cancel: &CancellationToken) -> Result<bool, StoreError> {
        ensure_live(cancel)?;
        Ok(file_exists(&self.record_path(id)).await?)
    }

    /// Unreadable or unparsable files are logged and skipped so one bad
    /// document does not hide every other saga.
    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<SagaRecord>, StoreError> {
        ensure_live(cancel)?;
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(FsStoreError::List {
                    path: self.dir.clone(),
                    source,
                }
                .into());
            }
        };

        let mut records = Vec::new();
        loop {
            let entry = entries
                .next_entry()
                .await
                .map_err(|source| FsStoreError::List {
                    path: self.dir.clone(),
                    source,
                })?;
            let Some(entry) = entry else { break };

            let path = entry.path();
            if !is_record_file(&path) {
                continue;
            }
            match read_record(&path).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable saga file"),
            }
        }

        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }
}
