//! Error types for seek-index.

use seek_embed::EmbedError;
use seek_store::VectorStoreError;

/// Errors surfaced by the index.
///
/// Transient failures are retried inside the coordinator and never leave it;
/// the remaining variants are structural and carry enough context to show to
/// the user.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Invalid device, model, endpoint, or tuning value at startup.
    #[error("{component} configuration error: {reason}")]
    Configuration {
        component: &'static str,
        reason: String,
    },

    /// Model weights missing, corrupt, or incompatible with the device.
    #[error("model loading failed: {0}")]
    ModelLoad(String),

    /// An embedding batch failed.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The vector store could not be reached or timed out.
    #[error("vector store unavailable: {0}")]
    VectorStoreUnavailable(String),

    /// Collection vector size differs from the embedding model output.
    #[error(
        "collection {collection} stores {found}-dimensional vectors but the model produces {expected}; re-index required"
    )]
    DimensionMismatch {
        collection: String,
        expected: u64,
        found: u64,
    },

    /// The collection was built with a different embedding model.
    #[error("collection {collection} was built with model {found}, configured model is {expected}; re-index required")]
    ModelMismatch {
        collection: String,
        expected: String,
        found: String,
    },

    #[error("{operation} timed out after {elapsed_ms} ms")]
    Timeout {
        operation: &'static str,
        elapsed_ms: u64,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `SQLite` state database error.
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed grammar or payload input. Chunker parse failures never leave the chunker.
    #[error("parse failed: {0}")]
    Parse(String),

    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),
}

impl IndexError {
    /// Whether retrying the operation later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Embedding(_) | Self::VectorStoreUnavailable(_) | Self::Timeout { .. }
        )
    }

    /// Structural failures that disable the index until the host intervenes.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::ModelLoad(_)
                | Self::DimensionMismatch { .. }
                | Self::ModelMismatch { .. }
        )
    }
}

impl From<EmbedError> for IndexError {
    fn from(e: EmbedError) -> Self {
        match e {
            EmbedError::ModelLoad(reason) => Self::ModelLoad(reason),
            EmbedError::DeviceUnavailable { .. } => Self::ModelLoad(e.to_string()),
            EmbedError::InvalidDevice(reason) => Self::Configuration {
                component: "embedding",
                reason,
            },
            other => Self::Embedding(other.to_string()),
        }
    }
}

impl From<VectorStoreError> for IndexError {
    fn from(e: VectorStoreError) -> Self {
        match e {
            VectorStoreError::DimensionMismatch {
                collection,
                expected,
                found,
            } => Self::DimensionMismatch {
                collection,
                expected,
                found,
            },
            VectorStoreError::Serialization(reason) => Self::Configuration {
                component: "vector store",
                reason,
            },
            other => Self::VectorStoreUnavailable(other.to_string()),
        }
    }
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
