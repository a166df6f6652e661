use std::cmp::Ordering;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("collection error: {0}")]
    Collection(String),
    #[error("collection {collection} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        collection: String,
        expected: u64,
        found: u64,
    },
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("delete error: {0}")]
    Delete(String),
    #[error("scroll error: {0}")]
    Scroll(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl VectorStoreError {
    /// Network or server-side failures that may clear up on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Upsert(_) | Self::Search(_) | Self::Delete(_) | Self::Scroll(_)
        )
    }
}

/// Similarity metric of a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Distance {
    /// Cosine similarity, higher is closer.
    #[default]
    Cosine,
    /// Raw dot product, higher is closer.
    Dot,
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub must: Vec<FieldCondition>,
    pub must_not: Vec<FieldCondition>,
}

impl VectorFilter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty()
    }

    #[must_use]
    pub fn must_match(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.must.push(FieldCondition {
            field: field.into(),
            value: value.into(),
        });
        self
    }
}

/// Exact match on a payload field. A text value also matches when the field
/// holds an array containing it.
#[derive(Debug, Clone)]
pub struct FieldCondition {
    pub field: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

#[derive(Debug, Clone)]
pub struct ScoredVectorPoint {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, serde_json::Value>,
}

/// Descending score, ties broken by ascending id.
pub fn rank_order(a: &ScoredVectorPoint, b: &ScoredVectorPoint) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.id.cmp(&b.id))
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// `key_field` value -> string payload fields of that point.
pub type ScrollResult = HashMap<String, HashMap<String, String>>;

/// Collection of `(id, vector, payload)` records with k-NN search.
///
/// Implementations are shared across workers and must be safe for concurrent use.
/// Upserts replace existing ids and deletes of unknown ids are no-ops.
pub trait VectorStore: Send + Sync {
    /// Create `collection` if absent.
    ///
    /// Fails with [`VectorStoreError::DimensionMismatch`] when the collection
    /// exists with a different vector size.
    fn ensure_collection(
        &self,
        collection: &str,
        dimension: u64,
        distance: Distance,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>>;

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    /// At most `limit` points ordered by [`rank_order`].
    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>>;

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn scroll_all(
        &self,
        collection: &str,
        key_field: &str,
    ) -> BoxFuture<'_, Result<ScrollResult, VectorStoreError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, score: f32) -> ScoredVectorPoint {
        ScoredVectorPoint {
            id: id.into(),
            score,
            payload: HashMap::new(),
        }
    }

    #[test]
    fn rank_order_breaks_ties_by_id() {
        let mut points = vec![point("b", 0.5), point("c", 0.9), point("a", 0.5)];
        points.sort_by(rank_order);
        let ids: Vec<_> = points.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn transient_classification() {
        assert!(VectorStoreError::Connection("down".into()).is_transient());
        assert!(!VectorStoreError::Serialization("bad".into()).is_transient());
        assert!(
            !VectorStoreError::DimensionMismatch {
                collection: "c".into(),
                expected: 3,
                found: 4,
            }
            .is_transient()
        );
    }

    #[test]
    fn filter_builder() {
        let f = VectorFilter::default().must_match("language", "rust");
        assert!(!f.is_empty());
        assert_eq!(f.must[0].value, FieldValue::Text("rust".into()));
    }
}
