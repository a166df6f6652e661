//! Text actually sent to the embedding model, and short display headers.

use std::fmt::Write as _;

use crate::chunker::Chunk;

/// Import lines kept in the embedding text.
const MAX_IMPORT_LINES: usize = 5;

/// Embedding text for a chunk: a commented header with path, scope, language
/// and the first imports, followed by the code itself.
#[must_use]
pub fn contextualize_for_embedding(chunk: &Chunk) -> String {
    let mut text = String::with_capacity(chunk.code.len() + 256);
    let _ = writeln!(text, "# {}", chunk.file_path);
    if !chunk.scope_chain.is_empty() {
        let _ = writeln!(text, "# Scope: {}", chunk.scope_chain);
    }
    if let Some(name) = &chunk.entity_name {
        let _ = writeln!(text, "# {}: {name}", chunk.kind);
    }
    let _ = writeln!(text, "# Language: {}", chunk.language);
    for line in chunk.imports.lines().take(MAX_IMPORT_LINES) {
        text.push_str(line);
        text.push('\n');
    }
    text.push_str(&chunk.code);
    text
}

/// `path :: name (lines a-b)`, naming the node type when there is no entity.
#[must_use]
pub fn display_header(
    file_path: &str,
    entity_name: Option<&str>,
    fallback: &str,
    line_range: (usize, usize),
) -> String {
    format!(
        "{file_path} :: {} (lines {}-{})",
        entity_name.unwrap_or(fallback),
        line_range.0,
        line_range.1
    )
}

#[must_use]
pub fn chunk_display_header(chunk: &Chunk) -> String {
    display_header(
        &chunk.file_path,
        chunk.entity_name.as_deref(),
        &chunk.node_type,
        chunk.line_range,
    )
}
