use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use seek_store::QdrantStore;

use crate::chunker::ChunkerConfig;
use crate::error::{IndexError, Result};
use crate::retry::RetryPolicy;

/// Payload fields indexed for filtered search.
pub const KEYWORD_FIELDS: [&str; 4] = ["language", "file_path", "path_prefixes", "kind"];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
    /// Create new collections with INT8 scalar quantization.
    #[serde(default = "default_true")]
    pub quantize_vectors: bool,
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

fn default_collection() -> String {
    "seek_code_chunks".into()
}

fn default_store_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            collection: default_collection(),
            timeout_secs: default_store_timeout_secs(),
            quantize_vectors: true,
        }
    }
}

impl StoreConfig {
    /// # Errors
    ///
    /// Returns a configuration error for an empty endpoint or collection name.
    pub fn validate(&self) -> Result<()> {
        if self.qdrant_url.trim().is_empty() {
            return Err(config_error("vector store", "qdrant_url must not be empty"));
        }
        if self.collection.trim().is_empty() {
            return Err(config_error("vector store", "collection must not be empty"));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be parsed into a client.
    pub fn build(&self) -> Result<QdrantStore> {
        let store = QdrantStore::new(&self.qdrant_url, Duration::from_secs(self.timeout_secs))
            .map_err(|e| config_error("vector store", e.to_string()))?;
        Ok(store
            .with_scalar_quantization(self.quantize_vectors)
            .with_keyword_indexes(KEYWORD_FIELDS))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerConfig {
    /// Files scanned concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Buffered change events before producers wait.
    #[serde(default = "default_event_queue")]
    pub queue_capacity: usize,
    /// Larger files are skipped by directory scans.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Deadline for one embedding or vector store call.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Interval between retries of stale files.
    #[serde(default = "default_stale_sweep_secs")]
    pub stale_sweep_secs: u64,
    /// `SQLite` file for the index state. Rebuilt from the vector store when unset.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default)]
    pub score_threshold: f32,
    #[serde(default)]
    pub chunker: ChunkerConfig,
}

fn default_workers() -> usize {
    4
}

fn default_event_queue() -> usize {
    1024
}

fn default_max_file_bytes() -> u64 {
    512 * 1024
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_stale_sweep_secs() -> u64 {
    30
}

fn default_k() -> usize {
    10
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_event_queue(),
            max_file_bytes: default_max_file_bytes(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            call_timeout_secs: default_call_timeout_secs(),
            stale_sweep_secs: default_stale_sweep_secs(),
            state_path: None,
            default_k: default_k(),
            score_threshold: 0.0,
            chunker: ChunkerConfig::default(),
        }
    }
}

impl IndexerConfig {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }

    #[must_use]
    pub fn stale_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.stale_sweep_secs)
    }

    /// # Errors
    ///
    /// Returns a configuration error for zero-sized pools or queues and for
    /// inconsistent chunk sizes.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(config_error("indexer", "workers must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(config_error("indexer", "queue_capacity must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(config_error("indexer", "max_attempts must be at least 1"));
        }
        if self.call_timeout_secs == 0 {
            return Err(config_error("indexer", "call_timeout_secs must be positive"));
        }
        if self.stale_sweep_secs == 0 {
            return Err(config_error("indexer", "stale_sweep_secs must be positive"));
        }
        if self.default_k == 0 {
            return Err(config_error("indexer", "default_k must be at least 1"));
        }
        let chunker = &self.chunker;
        if chunker.window_lines == 0 {
            return Err(config_error("chunker", "window_lines must be at least 1"));
        }
        if chunker.window_overlap >= chunker.window_lines {
            return Err(config_error(
                "chunker",
                format!(
                    "window_overlap ({}) must be smaller than window_lines ({})",
                    chunker.window_overlap, chunker.window_lines
                ),
            ));
        }
        if chunker.min_size > chunker.target_size || chunker.target_size > chunker.max_size {
            return Err(config_error(
                "chunker",
                "sizes must satisfy min_size <= target_size <= max_size",
            ));
        }
        Ok(())
    }
}

fn config_error(component: &'static str, reason: impl Into<String>) -> IndexError {
    IndexError::Configuration {
        component,
        reason: reason.into(),
    }
}
