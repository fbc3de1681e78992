//! Runtime configuration.
//!
//! Values resolve CLI flag first, then environment (`POLIS_DB`,
//! `POLIS_LOG`), then the YAML config file, then built-in defaults.

use crate::identity::{Identity, Role, StaticIdentityProvider};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_DB: &str = "POLIS_DB";
pub const ENV_LOG: &str = "POLIS_LOG";
pub const DEFAULT_LOG: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A bearer token's owner.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityEntry {
    pub user_id: String,
    pub role: Role,
}

/// Contents of the YAML config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct FileConfig {
    pub db_path: Option<PathBuf>,
    pub log: Option<String>,
    /// Token to identity
    pub identities: BTreeMap<String, IdentityEntry>,
    pub seed_on_start: bool,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Overrides taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub db_path: Option<PathBuf>,
    pub log: Option<String>,
    pub config: Option<PathBuf>,
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PolisConfig {
    pub db_path: PathBuf,
    pub log: String,
    pub identities: BTreeMap<String, IdentityEntry>,
    pub seed_on_start: bool,
}

/// `~/.local/share/polis/polis.db` or the platform equivalent.
pub fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir().unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("polis").join("polis.db")
}

impl PolisConfig {
    /// Resolve against the process environment.
    pub fn resolve(cli: CliOverrides) -> Result<Self, ConfigError> {
        Self::resolve_with(cli, |key| std::env::var(key).ok())
    }

    /// Resolve with an injected environment lookup.
    pub fn resolve_with(cli: CliOverrides, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let file = match cli.config {
            Some(ref path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let db_path = cli
            .db_path
            .or_else(|| env(ENV_DB).filter(|v| !v.is_empty()).map(PathBuf::from))
            .or(file.db_path)
            .unwrap_or_else(default_db_path);
        let log = cli
            .log
            .or_else(|| env(ENV_LOG).filter(|v| !v.is_empty()))
            .or(file.log)
            .unwrap_or_else(|| DEFAULT_LOG.to_string());

        Ok(Self {
            db_path,
            log,
            identities: file.identities,
            seed_on_start: file.seed_on_start,
        })
    }

    pub fn identity_provider(&self) -> StaticIdentityProvider {
        self.identities
            .iter()
            .fold(StaticIdentityProvider::new(), |provider, (token, entry)| {
                provider.with_token(token.clone(), Identity::new(entry.user_id.clone(), entry.role))
            })
    }
}
