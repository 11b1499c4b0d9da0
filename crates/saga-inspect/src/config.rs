use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{CliError, Result};

pub(crate) const DEFAULT_CONFIG_FILE: &str = "saga-inspect.toml";
pub(crate) const STORE_DIR_ENV: &str = "SAGA_STORE_DIR";
pub(crate) const DEFAULT_STORE_DIR: &str = ".sagas";

/// Settings read from `saga-inspect.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct InspectConfig {
    #[serde(default)]
    store_dir: Option<PathBuf>,
}

impl InspectConfig {
    #[must_use]
    pub(crate) fn store_dir(&self) -> Option<&Path> {
        self.store_dir.as_deref()
    }

    /// Load `explicit` if given; otherwise the default file when it exists.
    pub(crate) fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::read(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.is_file() {
                    Self::read(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|source| CliError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;

        // Relative store paths are relative to the config file.
        if let Some(dir) = config.store_dir.take() {
            let base = path.parent().unwrap_or_else(|| Path::new(""));
            config.store_dir = Some(if dir.is_relative() { base.join(dir) } else { dir });
        }
        Ok(config)
    }
}

/// Pick the store directory: flag, then config file, then environment.
pub(crate) fn resolve_store_dir(
    flag: Option<PathBuf>,
    config: &InspectConfig,
    env: Option<PathBuf>,
) -> PathBuf {
    flag.or_else(|| config.store_dir().map(Path::to_path_buf))
        .or(env)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR))
}
