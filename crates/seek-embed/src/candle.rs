//! BERT-family sentence embeddings on candle.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use serde::Deserialize;
use tokenizers::{PaddingStrategy, Tokenizer, TruncationParams};

use crate::batch::EmbedBackend;
use crate::device::{DeviceSpec, device_name, resolve_device};
use crate::error::{EmbedError, Result};
use crate::loader::{ModelSource, resolve_model_files};
use crate::provider::Embedding;
use crate::quantization::Quantization;

/// Positional-embedding limit applied when the config omits one.
const DEFAULT_MAX_POSITIONS: usize = 512;

#[derive(Deserialize)]
struct ModelDims {
    hidden_size: usize,
    #[serde(default = "default_max_positions")]
    max_position_embeddings: usize,
}

fn default_max_positions() -> usize {
    DEFAULT_MAX_POSITIONS
}

pub struct CandleBackend {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
    model_id: String,
}

impl std::fmt::Debug for CandleBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleBackend")
            .field("model_id", &self.model_id)
            .field("device", &device_name(&self.device))
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl CandleBackend {
    /// Load tokenizer and weights onto the resolved device.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::DeviceUnavailable`] if an explicit device cannot be
    /// opened, or [`EmbedError::ModelLoad`] if the model files are missing or
    /// incompatible.
    pub fn load(source: &ModelSource, device: DeviceSpec, quantization: Quantization) -> Result<Self> {
        let device = resolve_device(device)?;
        let files = resolve_model_files(source)?;

        let config_str = std::fs::read_to_string(&files.config)
            .map_err(|e| EmbedError::ModelLoad(format!("failed to read model config: {e}")))?;
        let config: BertConfig = serde_json::from_str(&config_str)?;
        let dims: ModelDims = serde_json::from_str(&config_str)?;
        let max_len = dims.max_position_embeddings.min(DEFAULT_MAX_POSITIONS);

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| EmbedError::ModelLoad(format!("failed to load tokenizer: {e}")))?;
        let mut padding = tokenizer.get_padding().cloned().unwrap_or_default();
        padding.strategy = PaddingStrategy::BatchLongest;
        tokenizer.with_padding(Some(padding));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_len,
                ..TruncationParams::default()
            }))
            .map_err(|e| EmbedError::ModelLoad(format!("invalid truncation settings: {e}")))?;

        let dtype = quantization.dtype(&device);
        // SAFETY: the weights file is owned by the model cache or a local model
        // directory and is not modified while the mapping is alive.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&files.weights], dtype, &device)? };
        let model = BertModel::load(vb, &config)
            .map_err(|e| EmbedError::ModelLoad(format!("incompatible model weights: {e}")))?;

        let model_id = source.model_id();
        tracing::info!(
            model = %model_id,
            device = device_name(&device),
            dtype = ?dtype,
            dimension = dims.hidden_size,
            "embedding model loaded"
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            dimension: dims.hidden_size,
            model_id,
        })
    }

    #[must_use]
    pub fn device_name(&self) -> &'static str {
        device_name(&self.device)
    }
}

impl EmbedBackend for CandleBackend {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbedError::Inference(format!("tokenizer encode failed: {e}")))?;

        let mut ids = Vec::with_capacity(encodings.len());
        let mut masks = Vec::with_capacity(encodings.len());
        let mut truncated = Vec::with_capacity(encodings.len());
        for encoding in &encodings {
            ids.push(Tensor::new(encoding.get_ids(), &self.device)?);
            masks.push(Tensor::new(encoding.get_attention_mask(), &self.device)?);
            truncated.push(!encoding.get_overflowing().is_empty());
        }

        let input_ids = Tensor::stack(&ids, 0)?;
        let attention_mask = Tensor::stack(&masks, 0)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?
            .to_dtype(DType::F32)?;
        let pooled = l2_normalize(&masked_mean_pool(&hidden, &attention_mask)?)?;
        let vectors = pooled.to_vec2::<f32>()?;

        Ok(vectors
            .into_iter()
            .zip(truncated)
            .map(|(vector, truncated)| Embedding { vector, truncated })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Mean over real tokens only, so padding never shifts a sequence's embedding.
pub(crate) fn masked_mean_pool(hidden: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = mask.to_dtype(DType::F32)?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?;
    summed.broadcast_div(&counts)
}

pub(crate) fn l2_normalize(t: &Tensor) -> candle_core::Result<Tensor> {
    let norm = t.sqr()?.sum_keepdim(1)?.sqrt()?;
    t.broadcast_div(&norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_does_not_change_pooled_vector() {
        let device = Device::Cpu;
        let padded = Tensor::new(
            &[
                [[1f32, 2.], [3., 4.], [100., -100.]],
                [[1., 2.], [3., 4.], [5., 6.]],
            ],
            &device,
        )
        .unwrap();
        let padded_mask = Tensor::new(&[[1u32, 1, 0], [1, 1, 1]], &device).unwrap();
        let alone = Tensor::new(&[[[1f32, 2.], [3., 4.]]], &device).unwrap();
        let alone_mask = Tensor::new(&[[1u32, 1]], &device).unwrap();

        let batched = masked_mean_pool(&padded, &padded_mask)
            .unwrap()
            .to_vec2::<f32>()
            .unwrap();
        let single = masked_mean_pool(&alone, &alone_mask)
            .unwrap()
            .to_vec2::<f32>()
            .unwrap();

        for (a, b) in batched[0].iter().zip(&single[0]) {
            assert!((a - b).abs() < 1e-6);
        }
        assert!((batched[1][0] - 3.0).abs() < 1e-6);
        assert!((batched[1][1] - 4.0).abs() < 1e-6);
    }

    #[test]
    fn normalized_rows_have_unit_length() {
        let t = Tensor::new(&[[3f32, 4.], [1., 0.]], &Device::Cpu).unwrap();
        let rows = l2_normalize(&t).unwrap().to_vec2::<f32>().unwrap();
        for row in rows {
            let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn missing_local_model_is_a_load_error() {
        let source = ModelSource::Local {
            path: std::env::temp_dir().join("seek-no-such-model"),
        };
        let err = CandleBackend::load(&source, DeviceSpec::Cpu, Quantization::Auto).unwrap_err();
        assert!(matches!(err, EmbedError::ModelLoad(_)));
    }
}
