//! Configuration loading for docrag.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at `~/.config/docrag/config.toml`.

use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::DocragError;

/// Which embedding backend to load.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Deterministic feature-hashing embedder (offline, no model files)
    #[default]
    Hash,
    /// all-MiniLM-L6-v2 via Candle
    Candle,
}

/// Embedding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default)]
    pub backend: EmbeddingBackend,

    /// Vector dimension D, fixed per deployment
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Hugging Face repository for the candle backend
    #[serde(default = "default_model_repo")]
    pub model_repo: String,
}

fn default_dimension() -> usize {
    384
}

fn default_model_repo() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            dimension: default_dimension(),
            model_repo: default_model_repo(),
        }
    }
}

/// Chunking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingSettings {
    /// Word budget for paragraph chunks (overflow-inclusive)
    #[serde(default = "default_max_words")]
    pub max_words: usize,

    /// Rows per chunk for csv/xlsx
    #[serde(default = "default_table_rows")]
    pub table_rows: usize,
}

fn default_max_words() -> usize {
    200
}

fn default_table_rows() -> usize {
    10
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_words: default_max_words(),
            table_rows: default_table_rows(),
        }
    }
}

/// Vector index implementation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Exhaustive squared-Euclidean scan
    #[default]
    Flat,
    /// Approximate HNSW graph (usearch)
    Hnsw,
}

/// Vector index settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSettings {
    #[serde(default)]
    pub kind: IndexKind,
}

/// Queue consumer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerSettings {
    /// Persist the index snapshot every N committed messages
    #[serde(default = "default_save_interval")]
    pub save_interval: usize,

    /// Maximum messages per receive call
    #[serde(default = "default_receive_batch")]
    pub receive_batch: usize,

    /// Long-poll wait per receive call
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,

    /// Lease duration granted per delivery
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    /// Deliveries allowed before a message is dead-lettered
    #[serde(default = "default_max_receives")]
    pub max_receives: u32,

    /// Checkpoint when the queue runs dry with unacknowledged work
    #[serde(default = "default_true")]
    pub flush_idle: bool,
}

fn default_save_interval() -> usize {
    10
}

fn default_receive_batch() -> usize {
    1
}

fn default_wait_secs() -> u64 {
    10
}

fn default_visibility_timeout_secs() -> u64 {
    300
}

fn default_max_receives() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            save_interval: default_save_interval(),
            receive_batch: default_receive_batch(),
            wait_secs: default_wait_secs(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            max_receives: default_max_receives(),
            flush_idle: default_true(),
        }
    }
}

/// HTTP settings for `serve`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_http_addr")]
    pub addr: String,
}

fn default_http_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            addr: default_http_addr(),
        }
    }
}

/// Retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

fn default_top_k() -> usize {
    3
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory for RocksDB stores and the object store
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Bucket holding uploads and index snapshots
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Fixed logical name of the index snapshot blob
    #[serde(default = "default_snapshot_key")]
    pub snapshot_key: String,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub chunking: ChunkingSettings,

    #[serde(default)]
    pub index: IndexSettings,

    #[serde(default)]
    pub consumer: ConsumerSettings,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub retrieval: RetrievalSettings,
}

fn default_data_dir() -> String {
    ProjectDirs::from("", "", "docrag")
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bucket() -> String {
    "documents".to_string()
}

fn default_snapshot_key() -> String {
    "index/vectors.snapshot".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            bucket: default_bucket(),
            snapshot_key: default_snapshot_key(),
            embedding: EmbeddingSettings::default(),
            chunking: ChunkingSettings::default(),
            index: IndexSettings::default(),
            consumer: ConsumerSettings::default(),
            http: HttpSettings::default(),
            retrieval: RetrievalSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/docrag/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (DOCRAG_*, nested keys joined by `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, DocragError> {
        let config_dir = ProjectDirs::from("", "", "docrag")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("data_dir", default_data_dir())
            .map_err(|e| DocragError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| DocragError::Config(e.to_string()))?
            .set_default("bucket", default_bucket())
            .map_err(|e| DocragError::Config(e.to_string()))?
            .set_default("snapshot_key", default_snapshot_key())
            .map_err(|e| DocragError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // DOCRAG_DATA_DIR, DOCRAG_CONSUMER__SAVE_INTERVAL, ...
        builder = builder.add_source(
            Environment::with_prefix("DOCRAG")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| DocragError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| DocragError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), DocragError> {
        if self.consumer.save_interval == 0 {
            return Err(DocragError::Config("consumer.save_interval must be > 0".into()));
        }
        if self.consumer.max_receives == 0 {
            return Err(DocragError::Config("consumer.max_receives must be > 0".into()));
        }
        if self.chunking.max_words == 0 {
            return Err(DocragError::Config("chunking.max_words must be > 0".into()));
        }
        if self.chunking.table_rows == 0 {
            return Err(DocragError::Config("chunking.table_rows must be > 0".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(DocragError::Config("embedding.dimension must be > 0".into()));
        }
        Ok(())
    }

    /// Expand `~/` in data_dir to the home directory
    pub fn expanded_data_dir(&self) -> PathBuf {
        if let Some(rest) = self.data_dir.strip_prefix("~/") {
            if let Some(base) = directories::BaseDirs::new() {
                return base.home_dir().join(rest);
            }
        }
        PathBuf::from(&self.data_dir)
    }

    /// RocksDB directory for chunk metadata
    pub fn metadata_path(&self) -> PathBuf {
        self.expanded_data_dir().join("metadata")
    }

    /// RocksDB directory for the work queue
    pub fn queue_path(&self) -> PathBuf {
        self.expanded_data_dir().join("queue")
    }

    /// Root directory of the filesystem object store
    pub fn objects_path(&self) -> PathBuf {
        self.expanded_data_dir().join("objects")
    }
}
