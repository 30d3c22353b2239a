//! Store configuration.
//!
//! # Responsibility
//! - Name the storage hierarchy (root, session folders, uploads).
//! - Hold the default session and the lock/cache limits.
//!
//! # Invariants
//! - Every field has a default; a partial JSON document is valid input.
//! - `validate` must pass before a store is built from a config.

use crate::model::session::{SessionId, SessionIdError};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Fixed-name root collection holding all session folders.
    pub root_folder_name: String,
    /// Session folders are named `{prefix}{session}`.
    pub session_folder_prefix: String,
    /// Folder under the root holding uploaded assets by category.
    pub uploads_folder_name: String,
    /// Session used until an active session is persisted.
    pub default_session: String,
    pub lock_timeout_ms: u64,
    /// TTL applied to cached table reads.
    pub cache_ttl_secs: u64,
    pub cache_max_ttl_secs: u64,
    pub cache_max_payload_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_folder_name: "School_ERP_Data".to_string(),
            session_folder_prefix: "Session_".to_string(),
            uploads_folder_name: "Uploads".to_string(),
            default_session: "2024-25".to_string(),
            lock_timeout_ms: 30_000,
            cache_ttl_secs: 300,
            cache_max_ttl_secs: 6 * 60 * 60,
            cache_max_payload_bytes: 100 * 1024,
        }
    }
}

impl StoreConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(value: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(value).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("root_folder_name", &self.root_folder_name),
            ("uploads_folder_name", &self.uploads_folder_name),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    message: "must not be empty".to_string(),
                });
            }
        }
        if self.uploads_folder_name.starts_with(&self.session_folder_prefix)
            && !self.session_folder_prefix.is_empty()
        {
            return Err(ConfigError::Invalid {
                field: "uploads_folder_name",
                message: "must not share the session folder prefix".to_string(),
            });
        }
        self.default_session()?;
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "lock_timeout_ms",
                message: "must be positive".to_string(),
            });
        }
        if self.cache_ttl_secs > self.cache_max_ttl_secs {
            return Err(ConfigError::Invalid {
                field: "cache_ttl_secs",
                message: format!("must not exceed cache_max_ttl_secs ({})", self.cache_max_ttl_secs),
            });
        }
        Ok(())
    }

    pub fn default_session(&self) -> Result<SessionId, ConfigError> {
        SessionId::parse(&self.default_session).map_err(ConfigError::DefaultSession)
    }

    /// Folder name for one session.
    pub fn session_folder_name(&self, session: &SessionId) -> String {
        format!("{}{}", self.session_folder_prefix, session)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_max_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_max_ttl_secs)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: String, message: String },
    Parse(serde_json::Error),
    Invalid { field: &'static str, message: String },
    DefaultSession(SessionIdError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, message } => write!(f, "failed to read config `{path}`: {message}"),
            Self::Parse(err) => write!(f, "invalid config document: {err}"),
            Self::Invalid { field, message } => write!(f, "invalid config `{field}`: {message}"),
            Self::DefaultSession(err) => write!(f, "invalid config `default_session`: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::DefaultSession(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, StoreConfig};

    #[test]
    fn defaults_are_valid() {
        let config = StoreConfig::default();
        config.validate().expect("default config should validate");
        assert_eq!(config.default_session().unwrap().as_str(), "2024-25");
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config =
            StoreConfig::from_json_str(r#"{ "default_session": "2025-26", "lock_timeout_ms": 500 }"#)
                .expect("partial config should parse");
        assert_eq!(config.default_session, "2025-26");
        assert_eq!(config.lock_timeout_ms, 500);
        assert_eq!(config.root_folder_name, "School_ERP_Data");
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            StoreConfig::from_json_str(r#"{ "default_session": "20 24" }"#).unwrap_err(),
            ConfigError::DefaultSession(_)
        ));
        assert!(matches!(
            StoreConfig::from_json_str(r#"{ "lock_timeout_ms": 0 }"#).unwrap_err(),
            ConfigError::Invalid { field: "lock_timeout_ms", .. }
        ));
        assert!(matches!(
            StoreConfig::from_json_str("{ not json").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, r#"{ "root_folder_name": "Campus" }"#).unwrap();
        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(config.root_folder_name, "Campus");
        assert!(matches!(
            StoreConfig::load(dir.path().join("missing.json")).unwrap_err(),
            ConfigError::Io { .. }
        ));
    }
}
