use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::device::DeviceSpec;
use crate::quantization::Quantization;

pub const DEFAULT_MODEL: &str = "BAAI/bge-small-en-v1.5";

/// Resolved embedding settings handed over by the host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbedConfig {
    /// `HuggingFace` repository id, used when `model_path` is unset.
    #[serde(default = "default_model")]
    pub model: String,
    /// Local model directory, takes precedence over `model`.
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    #[serde(default)]
    pub device: DeviceSpec,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub quantization: Quantization,
    /// Pending embedding requests before callers wait.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_model() -> String {
    DEFAULT_MODEL.into()
}

fn default_batch_size() -> usize {
    32
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            model_path: None,
            device: DeviceSpec::default(),
            batch_size: default_batch_size(),
            quantization: Quantization::default(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[cfg(feature = "candle")]
impl EmbedConfig {
    #[must_use]
    pub fn source(&self) -> crate::loader::ModelSource {
        match &self.model_path {
            Some(path) => crate::loader::ModelSource::Local { path: path.clone() },
            None => crate::loader::ModelSource::HuggingFace {
                repo_id: self.model.clone(),
            },
        }
    }

    /// Load the configured model and start its batching queue.
    ///
    /// Model loading runs on the blocking pool since it may hit the network
    /// cache and map large weight files.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is unavailable or the model fails to load.
    pub async fn build(&self) -> crate::Result<crate::BatchingEmbedder> {
        let source = self.source();
        let device = self.device;
        let quantization = self.quantization;
        let backend = tokio::task::spawn_blocking(move || {
            crate::candle::CandleBackend::load(&source, device, quantization)
        })
        .await
        .map_err(|e| crate::EmbedError::ModelLoad(format!("model loading task failed: {e}")))??;
        Ok(crate::BatchingEmbedder::new(
            backend,
            self.batch_size,
            self.queue_capacity,
        ))
    }
}
