//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Timeout for a single block-store operation, in seconds.
    #[serde(default = "default_block_io_timeout_secs")]
    pub block_io_timeout_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_block_io_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            block_io_timeout_secs: default_block_io_timeout_secs(),
        }
    }
}

/// Hot-block cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Hot-data store endpoint (e.g., "redis://127.0.0.1:6379").
    pub address: String,
    /// Cache entry TTL in seconds. 0 disables expiry.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    crate::DEFAULT_CACHE_TTL_SECS
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Local {
        /// Root directory for block storage.
        path: PathBuf,
    },
    /// Local filesystem storage fronted by a hot-block cache.
    LocalCached {
        /// Root directory for block storage.
        path: PathBuf,
        /// Cache settings.
        cache: CacheConfig,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Local {
            path: PathBuf::from("./data/blocks"),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// SQLite database file path.
    #[serde(default = "default_metadata_path")]
    pub path: PathBuf,
    /// How long a query may wait on the database lock, in seconds.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("./data/metadata.db")
}

fn default_query_timeout_secs() -> u64 {
    5
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

/// Chunker configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ChunkerConfig {
    /// Fixed-size blocks.
    Fixed {
        /// Block size in bytes.
        #[serde(default = "default_fixed_size")]
        size: usize,
    },
    /// Content-defined blocks.
    Cdc {
        /// Minimum block size in bytes.
        #[serde(default = "default_cdc_min")]
        min: usize,
        /// Target average block size in bytes.
        #[serde(default = "default_cdc_avg")]
        avg: usize,
        /// Maximum block size in bytes.
        #[serde(default = "default_cdc_max")]
        max: usize,
    },
}

fn default_fixed_size() -> usize {
    crate::DEFAULT_BLOCK_SIZE
}

fn default_cdc_min() -> usize {
    crate::DEFAULT_CDC_MIN
}

fn default_cdc_avg() -> usize {
    crate::DEFAULT_CDC_AVG
}

fn default_cdc_max() -> usize {
    crate::DEFAULT_CDC_MAX
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self::Fixed {
            size: default_fixed_size(),
        }
    }
}

impl ChunkerConfig {
    /// Validate chunker parameter invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Fixed { size } => {
                if *size == 0 {
                    return Err("chunker.size must be non-zero".to_string());
                }
                Ok(())
            }
            Self::Cdc { min, avg, max } => {
                if *min == 0 || min >= avg || avg >= max {
                    return Err(format!(
                        "chunker requires 0 < min < avg < max, got min={min} avg={avg} max={max}"
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Upload coordinator configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Session TTL in seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

fn default_session_ttl_secs() -> u64 {
    crate::DEFAULT_SESSION_TTL_SECS
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

/// Garbage collection configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GcConfig {
    /// Interval between sweeps in seconds. 0 disables periodic GC.
    #[serde(default)]
    pub interval_secs: u64,
    /// Maximum orphan rows examined per sweep batch.
    #[serde(default = "default_gc_batch_size")]
    pub batch_size: u32,
}

fn default_gc_batch_size() -> u32 {
    1000
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval_secs: 0,
            batch_size: default_gc_batch_size(),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Chunker configuration.
    #[serde(default)]
    pub chunker: ChunkerConfig,
    /// Upload coordinator configuration.
    #[serde(default)]
    pub upload: UploadConfig,
    /// Garbage collection configuration.
    #[serde(default)]
    pub gc: GcConfig,
}

impl AppConfig {
    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        self.chunker.validate()?;
        if self.upload.session_ttl_secs == 0 {
            return Err("upload.session_ttl_secs must be non-zero".to_string());
        }
        Ok(())
    }
}
