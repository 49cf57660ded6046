//! Node configuration for the Karma service.
//!
//! [`NodeConfig`] is loaded in layers: built-in defaults, then an optional
//! TOML file, then `KARMA_`-prefixed environment variables
//! (e.g. `KARMA_BIND_ADDR=0.0.0.0:8480`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8480";

/// Which store backs the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Persistent RocksDB database under `data_dir`.
    #[default]
    Rocksdb,
    /// Process-local store, lost on exit.
    Memory,
}

/// Configuration for a service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Socket address for the HTTP server.
    pub bind_addr: String,
    /// Log level filter string (e.g. "info", "debug", "karma_core=trace").
    pub log_level: String,
    /// Log output format: "text" or "json".
    pub log_format: String,
    pub store: StoreKind,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("karma");

        Self {
            data_dir,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            store: StoreKind::default(),
        }
    }
}

impl NodeConfig {
    /// Load defaults, then `file` if given, then the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(file, None)
    }

    /// As [`load`](Self::load), reading variables from `env` instead of the
    /// process environment when it is `Some`.
    pub fn load_with_env(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder
            .add_source(
                Environment::with_prefix("KARMA")
                    .prefix_separator("_")
                    .separator("__")
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }

    /// Path to the RocksDB ledger directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("ledger")
    }
}
