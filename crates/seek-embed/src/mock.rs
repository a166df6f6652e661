//! Deterministic embedding backend for tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::batch::EmbedBackend;
use crate::error::{EmbedError, Result};
use crate::provider::Embedding;

/// Bag-of-words feature hashing: each lowercase alphanumeric token adds weight
/// to one of `dimension` buckets. Texts sharing vocabulary score high under
/// cosine similarity, which is enough to exercise ranking end to end.
#[derive(Debug)]
pub struct HashingBackend {
    dimension: usize,
    max_tokens: usize,
    model_id: String,
    fail_next: AtomicUsize,
    calls: AtomicUsize,
}

impl HashingBackend {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            max_tokens: usize::MAX,
            model_id: "mock/hashing".into(),
            fail_next: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Tokens past this count are ignored and the result is flagged truncated.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Make the next `n` batches fail with an inference error.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn embed_one(&self, text: &str) -> Embedding {
        let mut vector = vec![0f32; self.dimension];
        let mut count = 0usize;
        let mut truncated = false;
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            if count == self.max_tokens {
                truncated = true;
                break;
            }
            count += 1;
            let token = token.to_lowercase();
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let bucket = usize::from(u16::from_le_bytes([bytes[0], bytes[1]])) % self.dimension;
            let sign = if bytes[2] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Embedding { vector, truncated }
    }
}

impl EmbedBackend for HashingBackend {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EmbedError::Inference("injected failure".into()));
        }
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
