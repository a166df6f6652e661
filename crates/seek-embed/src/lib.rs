//! Local text embeddings for code search.
//!
//! A model backend runs on one compute device and is owned by a batching
//! queue, so any number of callers can embed concurrently while the device
//! sees a single inference pass at a time.

pub mod batch;
#[cfg(feature = "candle")]
pub mod candle;
pub mod config;
pub mod device;
pub mod error;
#[cfg(feature = "candle")]
pub mod loader;
#[cfg(feature = "mock")]
pub mod mock;
pub mod provider;
pub mod quantization;
pub mod template;

pub use batch::{BatchingEmbedder, EmbedBackend};
pub use config::EmbedConfig;
pub use device::DeviceSpec;
pub use error::{EmbedError, Result};
pub use provider::{Embedding, EmbeddingProvider, TextKind};
pub use quantization::Quantization;
