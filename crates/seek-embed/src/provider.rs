use std::future::Future;

use crate::error::EmbedError;

/// Whether a text is a search query or an indexed document.
///
/// Asymmetric retrieval models expect different prompt prefixes for the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextKind {
    Query,
    Document,
}

/// One embedding result.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// L2-normalized vector of the provider's dimension.
    pub vector: Vec<f32>,
    /// The input exceeded the model context and its tail was dropped.
    pub truncated: bool,
}

pub trait EmbeddingProvider: Send + Sync {
    /// Embed `texts`, returning one result per input in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying inference pass fails or the provider
    /// has shut down.
    fn embed(
        &self,
        texts: &[String],
        kind: TextKind,
    ) -> impl Future<Output = Result<Vec<Embedding>, EmbedError>> + Send;

    /// Output vector dimension.
    fn dimension(&self) -> usize;

    /// Identifier recorded next to stored vectors so mixed models can be detected.
    fn model_id(&self) -> &str;
}
