use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{default_config_dir, ConfigError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Succeeded,
    Failed,
}

/// One user-triggered action, as appended to the ndjson log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionRecord {
    pub timestamp_unix_ms: u128,
    /// Short action name, e.g. `connect` or `execute`.
    pub action: String,
    /// Human-readable detail such as the SQL text or connection URL.
    pub detail: Option<String>,
    pub outcome: ActionOutcome,
    pub error: Option<String>,
    pub backtrace: Option<String>,
}

#[must_use]
pub fn unix_timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[derive(Debug, Error)]
pub enum ActionLogError {
    #[error("failed to resolve default config path: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid action log path `{0}`")]
    InvalidPath(PathBuf),
    #[error("failed to create action log directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize action record: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to append action record at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Append-only journal of user actions and their outcomes, one JSON object
/// per line.
#[derive(Debug, Clone)]
pub struct ActionLog {
    path: PathBuf,
}

impl ActionLog {
    pub fn load_default() -> Result<Self, ActionLogError> {
        Ok(Self {
            path: default_config_dir()?.join("actions.ndjson"),
        })
    }

    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &ActionRecord) -> Result<(), ActionLogError> {
        let parent_dir = self
            .path
            .parent()
            .ok_or_else(|| ActionLogError::InvalidPath(self.path.clone()))?;
        fs::create_dir_all(parent_dir).map_err(|source| ActionLogError::CreateDir {
            path: parent_dir.to_path_buf(),
            source,
        })?;

        let rendered =
            serde_json::to_string(record).map_err(|source| ActionLogError::Serialize { source })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| ActionLogError::Write {
                path: self.path.clone(),
                source,
            })?;
        writeln!(file, "{rendered}").map_err(|source| ActionLogError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
