use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::driver::DatabaseKind;

/// A named connection target the shell can reopen by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedConnection {
    pub name: String,
    pub kind: DatabaseKind,
    pub url: String,
}

impl SavedConnection {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: DatabaseKind, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            url: url.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read connections file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse connections file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to create config directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize connections: {source}")]
    Serialize {
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to write connections file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConnectionsDocument {
    #[serde(default)]
    connections: Vec<SavedConnection>,
}

impl ConnectionsDocument {
    fn normalize(&mut self) {
        let mut by_name = std::collections::BTreeMap::new();
        for connection in self.connections.drain(..) {
            by_name.insert(connection.name.clone(), connection);
        }
        self.connections = by_name.into_values().collect();
    }
}

/// File-backed store of saved connections (`connections.toml`).
#[derive(Debug, Clone)]
pub struct ConnectionStore {
    path: PathBuf,
    connections: Vec<SavedConnection>,
}

impl ConnectionStore {
    /// Store with no backing file contents; `persist` will create the file.
    #[must_use]
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            connections: Vec::new(),
        }
    }

    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_connections_path()?;
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                connections: Vec::new(),
            });
        }

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        if raw.trim().is_empty() {
            return Ok(Self {
                path,
                connections: Vec::new(),
            });
        }

        let mut doc: ConnectionsDocument =
            toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        doc.normalize();

        Ok(Self {
            path,
            connections: doc.connections,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn connections(&self) -> &[SavedConnection] {
        &self.connections
    }

    #[must_use]
    pub fn connection(&self, name: &str) -> Option<&SavedConnection> {
        self.connections
            .iter()
            .find(|connection| connection.name == name)
    }

    pub fn upsert(&mut self, connection: SavedConnection) {
        if let Some(existing) = self
            .connections
            .iter_mut()
            .find(|existing| existing.name == connection.name)
        {
            *existing = connection;
        } else {
            self.connections.push(connection);
            self.connections
                .sort_unstable_by(|a, b| a.name.cmp(&b.name));
        }
    }

    #[must_use]
    pub fn delete(&mut self, name: &str) -> bool {
        let original_len = self.connections.len();
        self.connections.retain(|connection| connection.name != name);
        self.connections.len() != original_len
    }

    pub fn persist(&self) -> Result<(), ConfigError> {
        if let Some(parent_dir) = self.path.parent() {
            fs::create_dir_all(parent_dir).map_err(|source| ConfigError::CreateDir {
                path: parent_dir.to_path_buf(),
                source,
            })?;
        }

        let doc = ConnectionsDocument {
            connections: self.connections.clone(),
        };
        let rendered =
            toml::to_string_pretty(&doc).map_err(|source| ConfigError::Serialize { source })?;

        fs::write(&self.path, rendered).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = if let Some(custom) = env::var_os("SQLGRID_CONFIG_DIR") {
        PathBuf::from(custom)
    } else if cfg!(target_os = "windows") {
        env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or(ConfigError::ConfigDirUnavailable)?
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        let home = env::var_os("HOME").ok_or(ConfigError::ConfigDirUnavailable)?;
        PathBuf::from(home).join(".config")
    };

    Ok(base_dir.join("sqlgrid"))
}

pub fn default_connections_path() -> Result<PathBuf, ConfigError> {
    Ok(default_config_dir()?.join("connections.toml"))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::{ConnectionStore, SavedConnection};
    use crate::driver::DatabaseKind;

    fn temp_connections_path(temp_dir: &TempDir) -> PathBuf {
        temp_dir.path().join("connections.toml")
    }

    #[test]
    fn missing_connections_file_loads_empty_store() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_connections_path(&temp_dir);

        let store = ConnectionStore::load_from_path(path).expect("failed to load store");
        assert!(store.connections().is_empty());
    }

    #[test]
    fn upsert_persist_reload_and_delete_connection() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_connections_path(&temp_dir);

        let mut store = ConnectionStore::load_from_path(&path).expect("failed to load store");
        let saved = SavedConnection::new("scratch", DatabaseKind::Sqlite, ":memory:");

        store.upsert(saved.clone());
        store.persist().expect("failed to persist store");

        let mut reloaded = ConnectionStore::load_from_path(&path).expect("failed to reload");
        let loaded = reloaded
            .connection("scratch")
            .expect("missing connection after save");
        assert_eq!(loaded, &saved);

        let mut updated = loaded.clone();
        updated.url = "/tmp/scratch.db".to_string();
        reloaded.upsert(updated.clone());
        reloaded
            .persist()
            .expect("failed to persist updated connection");

        let mut reloaded = ConnectionStore::load_from_path(&path).expect("failed to reload");
        let loaded = reloaded
            .connection("scratch")
            .expect("missing connection after update");
        assert_eq!(loaded.url, "/tmp/scratch.db");

        assert!(reloaded.delete("scratch"));
        reloaded.persist().expect("failed to persist deletion");

        let reloaded = ConnectionStore::load_from_path(path).expect("failed final reload");
        assert!(reloaded.connection("scratch").is_none());
        assert!(reloaded.connections().is_empty());
    }

    #[test]
    fn duplicate_names_collapse_to_the_last_entry() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_connections_path(&temp_dir);
        std::fs::write(
            &path,
            concat!(
                "[[connections]]\nname = \"db\"\nkind = \"sqlite\"\nurl = \"/a.db\"\n\n",
                "[[connections]]\nname = \"db\"\nkind = \"sqlite\"\nurl = \"/b.db\"\n",
            ),
        )
        .expect("failed to seed connections file");

        let store = ConnectionStore::load_from_path(&path).expect("failed to load store");
        assert_eq!(store.connections().len(), 1);
        assert_eq!(
            store.connection("db").map(|c| c.url.as_str()),
            Some("/b.db")
        );
    }
}
