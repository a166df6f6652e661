//! [`VectorStore`] over a Qdrant server.

use std::collections::HashMap;
use std::time::Duration;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfig;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
    FieldType, Filter, PointId, PointStruct, PointsIdsList, ScalarQuantizationBuilder,
    ScoredPoint, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder, value::Kind,
};

use crate::vector_store::{
    BoxFuture, Distance, FieldCondition, FieldValue, ScoredVectorPoint, ScrollResult, VectorFilter,
    VectorPoint, VectorStore, VectorStoreError, rank_order,
};

/// Payload field holding the caller's point id; Qdrant only accepts UUIDs or integers.
pub const POINT_ID_FIELD: &str = "point_id";

const SCROLL_PAGE: u32 = 100;

#[derive(Clone)]
pub struct QdrantStore {
    client: Qdrant,
    scalar_quantization: bool,
    keyword_indexes: Vec<String>,
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore")
            .field("scalar_quantization", &self.scalar_quantization)
            .field("keyword_indexes", &self.keyword_indexes)
            .finish_non_exhaustive()
    }
}

impl QdrantStore {
    /// Build a client for `url`. No connection is made until the first request.
    ///
    /// # Errors
    ///
    /// Returns [`VectorStoreError::Connection`] if the URL is invalid.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, VectorStoreError> {
        let client = Qdrant::from_url(url)
            .timeout(timeout)
            .build()
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            scalar_quantization: false,
            keyword_indexes: Vec::new(),
        })
    }

    /// Store an INT8 copy of vectors for faster search at a small recall cost.
    #[must_use]
    pub fn with_scalar_quantization(mut self, enabled: bool) -> Self {
        self.scalar_quantization = enabled;
        self
    }

    /// Payload fields to index as keywords when a collection is created.
    #[must_use]
    pub fn with_keyword_indexes<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keyword_indexes = fields.into_iter().map(Into::into).collect();
        self
    }

    async fn collection_dimension(&self, collection: &str) -> Result<Option<u64>, VectorStoreError> {
        let info = self
            .client
            .collection_info(collection)
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
        let config = info
            .result
            .and_then(|i| i.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config);
        Ok(match config {
            Some(VectorsConfig::Params(params)) => Some(params.size),
            _ => None,
        })
    }
}

/// Deterministic Qdrant point id for an arbitrary string id.
#[must_use]
pub fn qdrant_point_id(id: &str) -> PointId {
    let uuid = uuid::Uuid::parse_str(id)
        .unwrap_or_else(|_| uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, id.as_bytes()));
    PointId::from(uuid.to_string())
}

fn to_qdrant_distance(distance: Distance) -> qdrant_client::qdrant::Distance {
    match distance {
        Distance::Cosine => qdrant_client::qdrant::Distance::Cosine,
        Distance::Dot => qdrant_client::qdrant::Distance::Dot,
    }
}

impl VectorStore for QdrantStore {
    fn ensure_collection(
        &self,
        collection: &str,
        dimension: u64,
        distance: Distance,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let exists = self
                .client
                .collection_exists(&collection)
                .await
                .map_err(|e| VectorStoreError::Connection(e.to_string()))?;
            if exists {
                return match self.collection_dimension(&collection).await? {
                    Some(found) if found != dimension => Err(VectorStoreError::DimensionMismatch {
                        collection,
                        expected: dimension,
                        found,
                    }),
                    _ => Ok(()),
                };
            }

            let mut builder = CreateCollectionBuilder::new(&collection).vectors_config(
                VectorParamsBuilder::new(dimension, to_qdrant_distance(distance)),
            );
            if self.scalar_quantization {
                builder = builder.quantization_config(ScalarQuantizationBuilder::default());
            }
            self.client
                .create_collection(builder)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;

            for field in &self.keyword_indexes {
                self.client
                    .create_field_index(CreateFieldIndexCollectionBuilder::new(
                        &collection,
                        field,
                        FieldType::Keyword,
                    ))
                    .await
                    .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            }
            tracing::info!(collection = %collection, dimension, "qdrant collection created");
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.client
                .collection_exists(&collection)
                .await
                .map_err(|e| VectorStoreError::Connection(e.to_string()))
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.client
                .delete_collection(&collection)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
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
            if points.is_empty() {
                return Ok(());
            }
            let qdrant_points = points
                .into_iter()
                .map(|p| {
                    let mut payload = p.payload;
                    payload.insert(POINT_ID_FIELD.into(), serde_json::Value::String(p.id.clone()));
                    let payload: HashMap<String, qdrant_client::qdrant::Value> =
                        serde_json::from_value(serde_json::Value::Object(payload.into_iter().collect()))
                            .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
                    Ok(PointStruct::new(qdrant_point_id(&p.id), p.vector, payload))
                })
                .collect::<Result<Vec<_>, VectorStoreError>>()?;
            self.client
                .upsert_points(UpsertPointsBuilder::new(&collection, qdrant_points).wait(true))
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
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
            if limit == 0 {
                return Ok(Vec::new());
            }
            let mut builder =
                SearchPointsBuilder::new(&collection, vector, limit).with_payload(true);
            if let Some(f) = filter.filter(|f| !f.is_empty()) {
                builder = builder.filter(vector_filter_to_qdrant(f));
            }
            let response = self
                .client
                .search_points(builder)
                .await
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            let mut points: Vec<ScoredVectorPoint> =
                response.result.into_iter().map(scored_point_to_vector).collect();
            points.sort_by(rank_order);
            Ok(points)
        })
    }

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(());
            }
            let ids: Vec<PointId> = ids.iter().map(|id| qdrant_point_id(id)).collect();
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&collection)
                        .points(PointsIdsList { ids })
                        .wait(true),
                )
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
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
            if filter.is_empty() {
                return Err(VectorStoreError::Delete(
                    "refusing to delete with an empty filter".into(),
                ));
            }
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&collection)
                        .points(vector_filter_to_qdrant(filter))
                        .wait(true),
                )
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
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
            let mut result = HashMap::new();
            let mut offset: Option<PointId> = None;

            loop {
                let mut builder = ScrollPointsBuilder::new(&collection)
                    .with_payload(true)
                    .with_vectors(false)
                    .limit(SCROLL_PAGE);
                if let Some(ref off) = offset {
                    builder = builder.offset(off.clone());
                }

                let response = self
                    .client
                    .scroll(builder)
                    .await
                    .map_err(|e| VectorStoreError::Scroll(e.to_string()))?;

                for point in &response.result {
                    let Some(Kind::StringValue(key)) =
                        point.payload.get(&key_field).and_then(|v| v.kind.as_ref())
                    else {
                        continue;
                    };
                    let fields = point
                        .payload
                        .iter()
                        .filter_map(|(k, v)| match &v.kind {
                            Some(Kind::StringValue(s)) => Some((k.clone(), s.clone())),
                            _ => None,
                        })
                        .collect();
                    result.insert(key.clone(), fields);
                }

                match response.next_page_offset {
                    Some(next) => offset = Some(next),
                    None => break,
                }
            }

            Ok(result)
        })
    }
}

fn vector_filter_to_qdrant(filter: VectorFilter) -> Filter {
    let mut f = Filter::default();
    f.must = filter.must.into_iter().map(field_condition_to_qdrant).collect();
    f.must_not = filter
        .must_not
        .into_iter()
        .map(field_condition_to_qdrant)
        .collect();
    f
}

fn field_condition_to_qdrant(cond: FieldCondition) -> Condition {
    match cond.value {
        FieldValue::Integer(v) => Condition::matches(cond.field, v),
        FieldValue::Text(v) => Condition::matches(cond.field, v),
    }
}

fn qdrant_value_to_json(value: qdrant_client::qdrant::Value) -> Option<serde_json::Value> {
    Some(match value.kind? {
        Kind::StringValue(s) => serde_json::Value::String(s),
        Kind::IntegerValue(i) => serde_json::Value::Number(i.into()),
        Kind::DoubleValue(d) => serde_json::Number::from_f64(d).map(serde_json::Value::Number)?,
        Kind::BoolValue(b) => serde_json::Value::Bool(b),
        Kind::NullValue(_) => serde_json::Value::Null,
        Kind::ListValue(list) => serde_json::Value::Array(
            list.values
                .into_iter()
                .filter_map(qdrant_value_to_json)
                .collect(),
        ),
        Kind::StructValue(st) => serde_json::Value::Object(
            st.fields
                .into_iter()
                .filter_map(|(k, v)| Some((k, qdrant_value_to_json(v)?)))
                .collect(),
        ),
    })
}

fn scored_point_to_vector(point: ScoredPoint) -> ScoredVectorPoint {
    let mut payload: HashMap<String, serde_json::Value> = point
        .payload
        .into_iter()
        .filter_map(|(k, v)| Some((k, qdrant_value_to_json(v)?)))
        .collect();

    let id = match payload.remove(POINT_ID_FIELD) {
        Some(serde_json::Value::String(id)) => id,
        _ => match point.id.and_then(|pid| pid.point_id_options) {
            Some(PointIdOptions::Uuid(u)) => u,
            Some(PointIdOptions::Num(n)) => n.to_string(),
            None => String::new(),
        },
    };

    ScoredVectorPoint {
        id,
        score: point.score,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_valid_url() {
        assert!(QdrantStore::new("http://localhost:6334", Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn new_invalid_url() {
        assert!(QdrantStore::new("not a valid url", Duration::from_secs(5)).is_err());
    }

    #[test]
    fn debug_format() {
        let store = QdrantStore::new("http://localhost:6334", Duration::from_secs(5))
            .unwrap()
            .with_scalar_quantization(true)
            .with_keyword_indexes(["language"]);
        let dbg = format!("{store:?}");
        assert!(dbg.contains("QdrantStore"));
        assert!(dbg.contains("language"));
    }

    #[test]
    fn point_ids_are_deterministic_uuids() {
        let a = qdrant_point_id("3f1c0a");
        let b = qdrant_point_id("3f1c0a");
        let c = qdrant_point_id("other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(matches!(
            a.point_id_options,
            Some(PointIdOptions::Uuid(ref u)) if uuid::Uuid::parse_str(u).is_ok()
        ));
    }

    #[test]
    fn uuid_ids_pass_through() {
        let raw = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        assert_eq!(qdrant_point_id(raw), PointId::from(raw.to_string()));
    }

    #[test]
    fn scored_point_restores_original_id_and_lists() {
        let payload: HashMap<String, qdrant_client::qdrant::Value> =
            serde_json::from_value(serde_json::json!({
                "point_id": "chunk-1",
                "path_prefixes": ["src", "src/lib.rs"],
                "line_start": 3,
            }))
            .unwrap();
        let point = ScoredPoint {
            id: Some(qdrant_point_id("chunk-1")),
            payload,
            score: 0.75,
            ..ScoredPoint::default()
        };
        let converted = scored_point_to_vector(point);
        assert_eq!(converted.id, "chunk-1");
        assert!(!converted.payload.contains_key(POINT_ID_FIELD));
        assert_eq!(
            converted.payload["path_prefixes"],
            serde_json::json!(["src", "src/lib.rs"])
        );
        assert_eq!(converted.payload["line_start"], serde_json::json!(3));
    }

    #[test]
    fn filter_conversion_keeps_both_sides() {
        let filter = VectorFilter {
            must: vec![FieldCondition {
                field: "language".into(),
                value: FieldValue::Text("rust".into()),
            }],
            must_not: vec![FieldCondition {
                field: "line_start".into(),
                value: FieldValue::Integer(1),
            }],
        };
        let q = vector_filter_to_qdrant(filter);
        assert_eq!(q.must.len(), 1);
        assert_eq!(q.must_not.len(), 1);
    }
}
