use std::path::PathBuf;

use saga_engine::{SagaId, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("saga store error")]
    Store(#[from] StoreError),

    #[error("saga {0} not found")]
    SagaNotFound(SagaId),

    #[error("failed to render saga data")]
    Render(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::CliError;

    #[test]
    fn config_read_error_includes_path() {
        let err = CliError::ConfigRead {
            path: PathBuf::from("/etc/saga-inspect.toml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };

        let msg = err.to_string();

        assert!(msg.contains("/etc/saga-inspect.toml"));
    }

    #[test]
    fn store_error_converts_via_from() {
        let store_err = saga_engine::StoreError::Cancelled;

        let cli_err: CliError = store_err.into();

        assert!(matches!(cli_err, CliError::Store(_)));
    }

    #[test]
    fn not_found_names_the_saga() {
        let id = saga_engine::SagaId::new();

        let err = CliError::SagaNotFound(id);

        assert!(err.to_string().contains(&id.to_string()));
    }
}
