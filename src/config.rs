//! Persistence configuration.
//!
//! Typed records with serde defaults, aggregated into a single `Config`
//! loadable from a YAML file and `LUCIDA_`-prefixed environment variables.
//! Connection URIs are treated opaquely and handed to the driver layer.

use std::path::PathBuf;

use serde::Deserialize;

/// Event store backend discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Postgres,
    #[default]
    Sqlite,
    Memory,
}

/// Event store configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// PostgreSQL-specific configuration.
    pub postgres: PostgresConfig,
    /// SQLite-specific configuration.
    pub sqlite: SqliteConfig,
}

/// PostgreSQL-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Connection URI (DSN).
    pub uri: String,
    /// Maximum pool connections.
    pub pool_size: u32,
    /// Per-statement timeout applied on every pooled connection, if set.
    pub statement_timeout_ms: Option<u64>,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            uri: "postgres://localhost:5432/lucida".to_string(),
            pool_size: 5,
            statement_timeout_ms: None,
        }
    }
}

/// SQLite-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Connection URI or file path.
    pub uri: String,
    /// Maximum pool connections. In-memory databases exist per connection,
    /// so the default stays at 1.
    pub pool_size: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            uri: "sqlite::memory:".to_string(),
            pool_size: 1,
        }
    }
}

/// Blob store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlobStoreConfig {
    /// Root directory holding `tmp/` and `objects/`.
    pub root_path: PathBuf,
    /// Fsync files before rename and parent directories after.
    /// Default: true
    pub fsync: bool,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("data/blobs"),
            fsync: true,
        }
    }
}

/// Main persistence configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Event store configuration.
    pub storage: StorageConfig,
    /// Blob store configuration.
    pub blob_store: BlobStoreConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Sources (in order of priority, later overrides earlier):
    /// 1. `lucida.yaml` in the current directory (if present)
    /// 2. File named by the `LUCIDA_CONFIG` environment variable (if set)
    /// 3. Environment variables with the `LUCIDA_` prefix
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new("lucida", FileFormat::Yaml).required(false))
            .add_source(File::new("lucida.yaml", FileFormat::Yaml).required(false));

        if let Ok(config_path) = std::env::var("LUCIDA_CONFIG") {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        builder = builder.add_source(Environment::with_prefix("LUCIDA").separator("__"));

        let config = builder.build()?.try_deserialize()?;
        Ok(config)
    }
}
