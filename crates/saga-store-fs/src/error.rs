use std::path::PathBuf;

use saga_engine::StoreError;
use thiserror::Error;

/// Failure of the file-backed store, carrying the path involved.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FsStoreError {
    #[error("failed to create store directory '{path}'")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to list saga files in '{path}'")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read saga file '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write saga file '{path}'")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse saga file '{path}'")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize saga for '{path}'")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<FsStoreError> for StoreError {
    fn from(error: FsStoreError) -> Self {
        StoreError::backend(error)
    }
}
