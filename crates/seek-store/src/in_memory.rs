use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::vector_store::{
    BoxFuture, Distance, FieldValue, ScoredVectorPoint, ScrollResult, VectorFilter, VectorPoint,
    VectorStore, VectorStoreError, rank_order,
};

struct StoredPoint {
    vector: Vec<f32>,
    payload: HashMap<String, serde_json::Value>,
}

struct InMemoryCollection {
    dimension: u64,
    distance: Distance,
    points: HashMap<String, StoredPoint>,
}

/// Process-local [`VectorStore`] with exhaustive scoring.
///
/// Suitable for tests and small projects. Counts written points and can
/// simulate an outage.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, InMemoryCollection>>,
    upserted: AtomicUsize,
    deleted: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            upserted: AtomicUsize::new(0),
            deleted: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Total points passed to `upsert` so far.
    #[must_use]
    pub fn upserted_points(&self) -> usize {
        self.upserted.load(Ordering::SeqCst)
    }

    /// Total ids passed to `delete_by_ids` plus points removed by filter.
    #[must_use]
    pub fn deleted_points(&self) -> usize {
        self.deleted.load(Ordering::SeqCst)
    }

    /// Make every operation fail with a connection error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Ids stored in `collection`, sorted.
    #[must_use]
    pub fn point_ids(&self, collection: &str) -> Vec<String> {
        let Ok(cols) = self.collections.read() else {
            return Vec::new();
        };
        let mut ids: Vec<String> = cols
            .get(collection)
            .map(|c| c.points.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    fn check_available(&self) -> Result<(), VectorStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(VectorStoreError::Connection("store unavailable".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn score(distance: Distance, a: &[f32], b: &[f32]) -> f32 {
    match distance {
        Distance::Cosine => cosine_similarity(a, b),
        Distance::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
    }
}

pub(crate) fn matches_filter(
    payload: &HashMap<String, serde_json::Value>,
    filter: &VectorFilter,
) -> bool {
    for cond in &filter.must {
        let Some(val) = payload.get(&cond.field) else {
            return false;
        };
        if !field_matches(val, &cond.value) {
            return false;
        }
    }
    for cond in &filter.must_not {
        if let Some(val) = payload.get(&cond.field)
            && field_matches(val, &cond.value)
        {
            return false;
        }
    }
    true
}

fn field_matches(val: &serde_json::Value, expected: &FieldValue) -> bool {
    if let serde_json::Value::Array(items) = val {
        return items.iter().any(|item| field_matches(item, expected));
    }
    match expected {
        FieldValue::Integer(i) => val.as_i64() == Some(*i),
        FieldValue::Text(s) => val.as_str() == Some(s.as_str()),
    }
}

fn dimension_of(vector: &[f32]) -> u64 {
    u64::try_from(vector.len()).unwrap_or(u64::MAX)
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        dimension: u64,
        distance: Distance,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.check_available()?;
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            let col = cols
                .entry(collection.clone())
                .or_insert_with(|| InMemoryCollection {
                    dimension,
                    distance,
                    points: HashMap::new(),
                });
            if col.dimension != dimension {
                return Err(VectorStoreError::DimensionMismatch {
                    collection,
                    expected: dimension,
                    found: col.dimension,
                });
            }
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.check_available()?;
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(cols.contains_key(&collection))
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.check_available()?;
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            cols.remove(&collection);
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.check_available()?;
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Upsert(format!("collection {collection} not found"))
            })?;
            if let Some(bad) = points
                .iter()
                .find(|p| dimension_of(&p.vector) != col.dimension)
            {
                return Err(VectorStoreError::DimensionMismatch {
                    collection,
                    expected: col.dimension,
                    found: dimension_of(&bad.vector),
                });
            }
            self.upserted.fetch_add(points.len(), Ordering::SeqCst);
            for p in points {
                col.points.insert(
                    p.id,
                    StoredPoint {
                        vector: p.vector,
                        payload: p.payload,
                    },
                );
            }
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.check_available()?;
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            let col = cols.get(&collection).ok_or_else(|| {
                VectorStoreError::Search(format!("collection {collection} not found"))
            })?;

            let empty_filter = VectorFilter::default();
            let f = filter.as_ref().unwrap_or(&empty_filter);

            let mut scored: Vec<ScoredVectorPoint> = col
                .points
                .iter()
                .filter(|(_, sp)| matches_filter(&sp.payload, f))
                .map(|(id, sp)| ScoredVectorPoint {
                    id: id.clone(),
                    score: score(col.distance, &vector, &sp.vector),
                    payload: sp.payload.clone(),
                })
                .collect();

            scored.sort_by(rank_order);
            scored.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            Ok(scored)
        })
    }

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.check_available()?;
            if ids.is_empty() {
                return Ok(());
            }
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Delete(format!("collection {collection} not found"))
            })?;
            for id in &ids {
                if col.points.remove(id).is_some() {
                    self.deleted.fetch_add(1, Ordering::SeqCst);
                }
            }
            Ok(())
        })
    }

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.check_available()?;
            if filter.is_empty() {
                return Err(VectorStoreError::Delete(
                    "refusing to delete with an empty filter".into(),
                ));
            }
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Delete(format!("collection {collection} not found"))
            })?;
            let before = col.points.len();
            col.points.retain(|_, sp| !matches_filter(&sp.payload, &filter));
            self.deleted
                .fetch_add(before - col.points.len(), Ordering::SeqCst);
            Ok(())
        })
    }

    fn scroll_all(
        &self,
        collection: &str,
        key_field: &str,
    ) -> BoxFuture<'_, Result<ScrollResult, VectorStoreError>> {
        let collection = collection.to_owned();
        let key_field = key_field.to_owned();
        Box::pin(async move {
            self.check_available()?;
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Scroll(e.to_string()))?;
            let col = cols.get(&collection).ok_or_else(|| {
                VectorStoreError::Scroll(format!("collection {collection} not found"))
            })?;

            let mut result = HashMap::new();
            for sp in col.points.values() {
                let Some(key_val) = sp.payload.get(&key_field).and_then(|v| v.as_str()) else {
                    continue;
                };
                let mut fields = HashMap::new();
                for (k, v) in &sp.payload {
                    if let Some(s) = v.as_str() {
                        fields.insert(k.clone(), s.to_owned());
                    }
                }
                result.insert(key_val.to_owned(), fields);
            }
            Ok(result)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::FieldCondition;

    fn point(id: &str, vector: Vec<f32>, payload: serde_json::Value) -> VectorPoint {
        let payload = match payload {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            _ => HashMap::new(),
        };
        VectorPoint {
            id: id.into(),
            vector,
            payload,
        }
    }

    #[tokio::test]
    async fn ensure_collection_and_exists() {
        let store = InMemoryVectorStore::new();
        assert!(!store.collection_exists("test").await.unwrap());
        store
            .ensure_collection("test", 3, Distance::Cosine)
            .await
            .unwrap();
        assert!(store.collection_exists("test").await.unwrap());
    }

    #[tokio::test]
    async fn ensure_collection_idempotent() {
        let store = InMemoryVectorStore::new();
        store
            .ensure_collection("test", 3, Distance::Cosine)
            .await
            .unwrap();
        store
            .ensure_collection("test", 3, Distance::Cosine)
            .await
            .unwrap();
        assert!(store.collection_exists("test").await.unwrap());
    }

    #[tokio::test]
    async fn ensure_collection_rejects_other_dimension() {
        let store = InMemoryVectorStore::new();
        store
            .ensure_collection("test", 3, Distance::Cosine)
            .await
            .unwrap();
        let err = store
            .ensure_collection("test", 4, Distance::Cosine)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch {
                expected: 4,
                found: 3,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn delete_collection_removes() {
        let store = InMemoryVectorStore::new();
        store
            .ensure_collection("test", 3, Distance::Cosine)
            .await
            .unwrap();
        store.delete_collection("test").await.unwrap();
        assert!(!store.collection_exists("test").await.unwrap());
    }

    #[tokio::test]
    async fn upsert_replaces_existing_id() {
        let store = InMemoryVectorStore::new();
        store
            .ensure_collection("test", 2, Distance::Cosine)
            .await
            .unwrap();
        store
            .upsert("test", vec![point("a", vec![1.0, 0.0], serde_json::json!({"v": "old"}))])
            .await
            .unwrap();
        store
            .upsert("test", vec![point("a", vec![0.0, 1.0], serde_json::json!({"v": "new"}))])
            .await
            .unwrap();

        let results = store.search("test", vec![0.0, 1.0], 10, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].payload["v"], "new");
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let store = InMemoryVectorStore::new();
        store
            .ensure_collection("test", 3, Distance::Cosine)
            .await
            .unwrap();
        let err = store
            .upsert("test", vec![point("a", vec![1.0], serde_json::json!({}))])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn search_orders_by_score_then_id_and_limits() {
        let store = InMemoryVectorStore::new();
        store
            .ensure_collection("test", 2, Distance::Cosine)
            .await
            .unwrap();
        store
            .upsert(
                "test",
                vec![
                    point("c", vec![1.0, 0.0], serde_json::json!({})),
                    point("a", vec![1.0, 0.0], serde_json::json!({})),
                    point("b", vec![0.0, 1.0], serde_json::json!({})),
                    point("d", vec![0.7, 0.7], serde_json::json!({})),
                ],
            )
            .await
            .unwrap();

        let results = store.search("test", vec![1.0, 0.0], 3, None).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "c", "d"]);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn search_with_filter_matches_arrays() {
        let store = InMemoryVectorStore::new();
        store
            .ensure_collection("test", 2, Distance::Cosine)
            .await
            .unwrap();
        store
            .upsert(
                "test",
                vec![
                    point(
                        "a",
                        vec![1.0, 0.0],
                        serde_json::json!({"dirs": ["src", "src/net"]}),
                    ),
                    point("b", vec![1.0, 0.0], serde_json::json!({"dirs": ["tests"]})),
                ],
            )
            .await
            .unwrap();

        let filter = VectorFilter {
            must: vec![FieldCondition {
                field: "dirs".into(),
                value: FieldValue::Text("src/net".into()),
            }],
            must_not: vec![],
        };
        let results = store
            .search("test", vec![1.0, 0.0], 10, Some(filter))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn delete_by_ids_is_idempotent() {
        let store = InMemoryVectorStore::new();
        store
            .ensure_collection("test", 2, Distance::Cosine)
            .await
            .unwrap();
        store
            .upsert("test", vec![point("a", vec![1.0, 0.0], serde_json::json!({}))])
            .await
            .unwrap();
        store.delete_by_ids("test", vec!["a".into()]).await.unwrap();
        store
            .delete_by_ids("test", vec!["a".into(), "ghost".into()])
            .await
            .unwrap();
        assert!(store.point_ids("test").is_empty());
        assert_eq!(store.deleted_points(), 1);
    }

    #[tokio::test]
    async fn delete_by_filter_removes_matching() {
        let store = InMemoryVectorStore::new();
        store
            .ensure_collection("test", 2, Distance::Cosine)
            .await
            .unwrap();
        store
            .upsert(
                "test",
                vec![
                    point("a", vec![1.0, 0.0], serde_json::json!({"file": "x.rs"})),
                    point("b", vec![1.0, 0.0], serde_json::json!({"file": "x.rs"})),
                    point("c", vec![1.0, 0.0], serde_json::json!({"file": "y.rs"})),
                ],
            )
            .await
            .unwrap();
        store
            .delete_by_filter("test", VectorFilter::default().must_match("file", "x.rs"))
            .await
            .unwrap();
        assert_eq!(store.point_ids("test"), ["c"]);
        assert!(
            store
                .delete_by_filter("test", VectorFilter::default())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn scroll_all_extracts_strings() {
        let store = InMemoryVectorStore::new();
        store
            .ensure_collection("test", 3, Distance::Cosine)
            .await
            .unwrap();
        store
            .upsert(
                "test",
                vec![point(
                    "a",
                    vec![1.0, 0.0, 0.0],
                    serde_json::json!({"name": "alpha", "desc": "first", "num": 42}),
                )],
            )
            .await
            .unwrap();

        let result = store.scroll_all("test", "name").await.unwrap();
        assert_eq!(result.len(), 1);
        let fields = result.get("alpha").unwrap();
        assert_eq!(fields.get("desc").unwrap(), "first");
        assert!(!fields.contains_key("num"));
    }

    #[tokio::test]
    async fn unavailable_store_fails_with_connection_error() {
        let store = InMemoryVectorStore::new();
        store.set_unavailable(true);
        let err = store.collection_exists("test").await.unwrap_err();
        assert!(err.is_transient());
        store.set_unavailable(false);
        assert!(!store.collection_exists("test").await.unwrap());
    }

    #[test]
    fn cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &b)).abs() < f32::EPSILON);
    }

    #[test]
    fn debug_format() {
        let store = InMemoryVectorStore::new();
        let dbg = format!("{store:?}");
        assert!(dbg.contains("InMemoryVectorStore"));
    }
}
