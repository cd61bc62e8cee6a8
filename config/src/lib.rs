//! Settings for the backlink bot, read from a single TOML file.

use backlink_catalog::DEFAULT_EDIT_COMMENT;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "backlink.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BacklinkConfig {
    /// File with one API key hash per line.
    pub api_key_file: PathBuf,
    /// SQLite database holding the work items.
    pub sqlite: PathBuf,
    /// Directory polled for `*.tsv` drops.
    pub watch_dir: PathBuf,
    /// Pause between two catalog edits, in seconds.
    #[serde(default = "default_item_delay_secs")]
    pub item_delay_secs: f64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default)]
    pub catalog: CatalogSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CatalogSettings {
    pub base_url: String,
    /// Edit summary attached to every write.
    pub comment: String,
    /// Per-request timeout; 0 disables it.
    pub timeout_secs: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            comment: default_comment(),
            timeout_secs: 30,
        }
    }
}

impl CatalogSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

fn default_item_delay_secs() -> f64 {
    0.8
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn default_base_url() -> String {
    "https://openlibrary.org".to_string()
}

fn default_comment() -> String {
    DEFAULT_EDIT_COMMENT.to_string()
}

impl BacklinkConfig {
    /// Read, resolve and validate the config at `path`.
    ///
    /// Relative paths inside the file are taken relative to the file's own
    /// directory, not the process working directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let config = Self::from_toml_str(&contents, path, base_dir)?;
        debug!(config = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(
        contents: &str,
        path: &Path,
        base_dir: &Path,
    ) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate(path)?;
        config.api_key_file = resolve(base_dir, &config.api_key_file);
        config.sqlite = resolve(base_dir, &config.sqlite);
        config.watch_dir = resolve(base_dir, &config.watch_dir);
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        };
        for (name, value) in [
            ("api_key_file", &self.api_key_file),
            ("sqlite", &self.sqlite),
            ("watch_dir", &self.watch_dir),
        ] {
            if value.as_os_str().is_empty() {
                return Err(invalid(format!("{name} must not be empty")));
            }
        }
        if Duration::try_from_secs_f64(self.item_delay_secs).is_err() {
            return Err(invalid(format!(
                "item_delay_secs must be a non-negative number of seconds, got {}",
                self.item_delay_secs
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(invalid("poll_interval_secs must be at least 1".to_string()));
        }
        if self.catalog.base_url.trim().is_empty() {
            return Err(invalid("catalog.base_url must not be empty".to_string()));
        }
        Ok(())
    }

    /// Zero for a value [`BacklinkConfig::load`] would have rejected.
    pub fn item_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.item_delay_secs).unwrap_or_default()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
