//! Configuration System
//!
//! Typed settings for the interval store with environment variable
//! overrides. Parsing a configuration *file* is the host application's
//! concern; this module only defines the store's own knobs.

use serde::Deserialize;
use std::path::PathBuf;

/// Interval store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Directory holding `YYYY-MM.data`, `tags.data` and `undo.data`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Retained undo transactions: 0 keeps everything, a negative value
    /// disables journal persistence
    #[serde(default = "default_journal_size")]
    pub journal_size: i32,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".tempo").join("data"))
        .unwrap_or_else(|| PathBuf::from("./tempo_data"))
}

fn default_journal_size() -> i32 {
    10_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            journal_size: default_journal_size(),
        }
    }
}

impl StoreConfig {
    /// Configuration rooted at a specific data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Builder: set the journal bound
    pub fn journal_size(mut self, size: i32) -> Self {
        self.journal_size = size;
        self
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides to an existing config
    pub fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = std::env::var("TEMPO_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(size) = std::env::var("TEMPO_JOURNAL_SIZE") {
            if let Ok(s) = size.parse() {
                self.journal_size = s;
            }
        }
    }

    /// Get path to the tag index sidecar
    pub fn tags_path(&self) -> PathBuf {
        self.data_dir.join("tags.data")
    }

    /// Get path to the undo journal
    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("undo.data")
    }
}
