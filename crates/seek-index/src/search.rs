//! Query types, stored payload schema, and result rendering.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use seek_store::{ScoredVectorPoint, VectorFilter};

use crate::chunker::{Chunk, ChunkId, ChunkKind};
use crate::context::display_header;
use crate::error::{IndexError, Result};
use crate::languages::Lang;
use crate::state::Fingerprint;

/// Restricts a search to matching chunks. Every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub language: Option<Lang>,
    /// Directory or file path, matched on whole path components:
    /// `src/index` matches `src/index/mod.rs` but not `src/indexer.rs`.
    pub path_prefix: Option<String>,
    pub kind: Option<ChunkKind>,
}

impl SearchFilter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.language.is_none() && self.path_prefix.is_none() && self.kind.is_none()
    }

    pub(crate) fn to_vector_filter(&self) -> Option<VectorFilter> {
        if self.is_empty() {
            return None;
        }
        let mut filter = VectorFilter::default();
        if let Some(lang) = self.language {
            filter = filter.must_match("language", lang.id());
        }
        if let Some(prefix) = &self.path_prefix {
            let prefix = prefix.trim_start_matches("./").trim_end_matches('/');
            filter = filter.must_match("path_prefixes", prefix);
        }
        if let Some(kind) = self.kind {
            filter = filter.must_match("kind", kind.as_str());
        }
        Some(filter)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    /// Maximum number of results; the configured default when `None`.
    pub k: Option<usize>,
    pub filter: SearchFilter,
    /// Results scoring below this are dropped.
    pub min_score: Option<f32>,
}

impl SearchQuery {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            k: None,
            filter: SearchFilter::default(),
            min_score: None,
        }
    }

    #[must_use]
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub chunk_id: ChunkId,
    pub file_path: String,
    /// 1-based, inclusive.
    pub line_range: (usize, usize),
    /// Cosine similarity, higher is closer.
    pub score: f32,
    pub snippet: String,
    pub language: Lang,
    pub kind: ChunkKind,
    pub entity_name: Option<String>,
}

impl SearchResult {
    pub(crate) fn from_scored(point: ScoredVectorPoint) -> Result<Self> {
        let payload = ChunkPayload::from_fields(point.payload)?;
        Ok(Self {
            chunk_id: ChunkId::from(payload.chunk_id),
            file_path: payload.file_path,
            line_range: (payload.line_start, payload.line_end),
            score: point.score,
            snippet: payload.code,
            language: payload.language,
            kind: payload.kind,
            entity_name: payload.entity_name,
        })
    }

    #[must_use]
    pub fn header(&self) -> String {
        display_header(
            &self.file_path,
            self.entity_name.as_deref(),
            self.kind.as_str(),
            self.line_range,
        )
    }
}

/// Payload stored with every vector. Carries everything needed to render a
/// result and to rebuild the index state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub chunk_id: String,
    pub file_path: String,
    /// Every leading path of `file_path`, itself included.
    pub path_prefixes: Vec<String>,
    pub language: Lang,
    pub kind: ChunkKind,
    pub node_type: String,
    #[serde(default)]
    pub entity_name: Option<String>,
    pub line_start: usize,
    pub line_end: usize,
    pub code: String,
    #[serde(default)]
    pub scope_chain: String,
    pub file_fingerprint: String,
    pub embedding_model: String,
}

impl ChunkPayload {
    #[must_use]
    pub fn new(chunk: &Chunk, fingerprint: Fingerprint, model_id: &str) -> Self {
        Self {
            chunk_id: chunk.id.to_string(),
            file_path: chunk.file_path.clone(),
            path_prefixes: path_prefixes(&chunk.file_path),
            language: chunk.language,
            kind: chunk.kind,
            node_type: chunk.node_type.clone(),
            entity_name: chunk.entity_name.clone(),
            line_start: chunk.line_range.0,
            line_end: chunk.line_range.1,
            code: chunk.code.clone(),
            scope_chain: chunk.scope_chain.clone(),
            file_fingerprint: fingerprint.to_hex(),
            embedding_model: model_id.to_owned(),
        }
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn into_fields(self) -> Result<HashMap<String, serde_json::Value>> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(IndexError::Parse(format!(
                "payload serialized to non-object: {other}"
            ))),
        }
    }

    /// # Errors
    ///
    /// Returns an error if a required field is missing or mistyped.
    pub fn from_fields(fields: HashMap<String, serde_json::Value>) -> Result<Self> {
        let object: serde_json::Map<String, serde_json::Value> = fields.into_iter().collect();
        Ok(serde_json::from_value(serde_json::Value::Object(object))?)
    }
}

/// `src/a/b.rs` yields `src`, `src/a`, `src/a/b.rs`.
#[must_use]
pub fn path_prefixes(file_path: &str) -> Vec<String> {
    let mut prefixes = Vec::new();
    let mut end = 0;
    for part in file_path.split('/') {
        if part.is_empty() {
            end += 1;
            continue;
        }
        end += part.len();
        prefixes.push(file_path[..end].trim_start_matches('/').to_owned());
        end += 1;
    }
    prefixes
}

/// Render results as markdown: a bold `path:start:end` line and a fenced
/// snippet per hit.
#[must_use]
pub fn format_as_markdown(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results found for the query.".to_string();
    }
    let mut out = String::new();
    for result in results {
        let _ = write!(
            out,
            "**{}:{}:{}**\n```{}\n{}\n```\n\n",
            result.file_path,
            result.line_range.0,
            result.line_range.1,
            result.language,
            result.snippet
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use seek_store::FieldValue;

    use super::*;

    fn sample_chunk() -> Chunk {
        Chunk {
            id: ChunkId::from("c0ffee".to_string()),
            code: "fn foo() {}".into(),
            file_path: "src/lib.rs".into(),
            language: Lang::Rust,
            kind: ChunkKind::Function,
            node_type: "function_item".into(),
            entity_name: Some("foo".into()),
            byte_range: 0..11,
            line_range: (1, 1),
            scope_chain: String::new(),
            imports: String::new(),
        }
    }

    #[test]
    fn path_prefixes_cover_each_component() {
        assert_eq!(
            path_prefixes("src/a/b.rs"),
            vec!["src".to_string(), "src/a".into(), "src/a/b.rs".into()]
        );
        assert_eq!(path_prefixes("main.rs"), vec!["main.rs".to_string()]);
    }

    #[test]
    fn payload_fields_roundtrip() {
        let payload = ChunkPayload::new(&sample_chunk(), Fingerprint::of(b"x"), "mock/hashing");
        let fields = payload.clone().into_fields().unwrap();
        assert_eq!(fields["language"], serde_json::json!("rust"));
        assert_eq!(fields["kind"], serde_json::json!("function"));
        assert_eq!(fields["path_prefixes"], serde_json::json!(["src", "src/lib.rs"]));
        assert_eq!(ChunkPayload::from_fields(fields).unwrap(), payload);
    }

    #[test]
    fn result_from_scored_point() {
        let payload = ChunkPayload::new(&sample_chunk(), Fingerprint::of(b"x"), "m");
        let point = ScoredVectorPoint {
            id: "c0ffee".into(),
            score: 0.8,
            payload: payload.into_fields().unwrap(),
        };
        let result = SearchResult::from_scored(point).unwrap();
        assert_eq!(result.file_path, "src/lib.rs");
        assert_eq!(result.line_range, (1, 1));
        assert_eq!(result.header(), "src/lib.rs :: foo (lines 1-1)");
    }

    #[test]
    fn malformed_payload_rejected() {
        let point = ScoredVectorPoint {
            id: "x".into(),
            score: 0.1,
            payload: HashMap::from([("file_path".to_string(), serde_json::json!(3))]),
        };
        assert!(SearchResult::from_scored(point).is_err());
    }

    #[test]
    fn empty_filter_has_no_vector_filter() {
        assert!(SearchFilter::default().to_vector_filter().is_none());
    }

    #[test]
    fn filter_maps_fields() {
        let filter = SearchFilter {
            language: Some(Lang::Python),
            path_prefix: Some("./src/".into()),
            kind: Some(ChunkKind::Class),
        }
        .to_vector_filter()
        .unwrap();
        let fields: Vec<_> = filter.must.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["language", "path_prefixes", "kind"]);
        assert_eq!(filter.must[1].value, FieldValue::Text("src".into()));
    }

    #[test]
    fn markdown_rendering() {
        assert_eq!(format_as_markdown(&[]), "No results found for the query.");
        let result = SearchResult {
            chunk_id: ChunkId::from("a".to_string()),
            file_path: "src/lib.rs".into(),
            line_range: (3, 5),
            score: 0.9,
            snippet: "fn foo() {}".into(),
            language: Lang::Rust,
            kind: ChunkKind::Function,
            entity_name: None,
        };
        assert_eq!(
            format_as_markdown(&[result]),
            "**src/lib.rs:3:5**\n```rust\nfn foo() {}\n```\n\n"
        );
    }
}
