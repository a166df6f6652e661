#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("model loading failed: {0}")]
    ModelLoad(String),

    #[error("device {device} unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    #[error("invalid device specification: {0}")]
    InvalidDevice(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("embedding queue closed")]
    Closed,

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "candle")]
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl EmbedError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Inference(_))
    }
}

pub type Result<T> = std::result::Result<T, EmbedError>;
