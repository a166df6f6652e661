//! AST-based chunking via tree-sitter, with line windows as the fallback.
//!
//! Every entity node (function, class, impl, ...) becomes its own chunk.
//! Non-entity siblings are grouped greedily; anything above `max_size` is
//! split recursively at child boundaries. Output is deterministic and the
//! chunks of one pass never overlap.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser};

use crate::context::contextualize_for_embedding;
use crate::languages::Lang;

/// Bumped whenever chunk boundaries or the embedding text change, so every id
/// is re-derived.
pub const CHUNKER_VERSION: u32 = 2;

/// Content-addressed chunk identifier (blake3 hex).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// Hashes the exact text handed to the model, so a changed import or an
    /// enclosing rename re-embeds the chunk.
    fn derive(
        file_path: &str,
        line_range: (usize, usize),
        kind: ChunkKind,
        embed_text: &str,
    ) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&CHUNKER_VERSION.to_le_bytes());
        hasher.update(file_path.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(line_range.0 as u64).to_le_bytes());
        hasher.update(&(line_range.1 as u64).to_le_bytes());
        hasher.update(kind.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(embed_text.as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ChunkId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", &self.0[..self.0.len().min(12)])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Function,
    Class,
    Block,
    Window,
}

impl ChunkKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Block => "block",
            Self::Window => "window",
        }
    }

    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        [Self::Function, Self::Class, Self::Block, Self::Window]
            .into_iter()
            .find(|k| k.as_str() == id)
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chunk of source code with rich metadata.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: ChunkId,
    pub code: String,
    pub file_path: String,
    pub language: Lang,
    pub kind: ChunkKind,
    pub node_type: String,
    pub entity_name: Option<String>,
    pub byte_range: Range<usize>,
    /// 1-based, inclusive.
    pub line_range: (usize, usize),
    pub scope_chain: String,
    pub imports: String,
}

/// Chunker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Target size of a grouped block in non-whitespace characters.
    pub target_size: usize,
    /// Nodes larger than this are split at child boundaries.
    pub max_size: usize,
    /// Grouped blocks smaller than this are dropped.
    pub min_size: usize,
    /// Lines per fallback window.
    pub window_lines: usize,
    /// Lines shared by consecutive windows. Zero keeps chunks disjoint.
    pub window_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_size: 600,
            max_size: 1200,
            min_size: 100,
            window_lines: 40,
            window_overlap: 0,
        }
    }
}

/// How a file is split, decided once per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Grammar,
    Window,
}

impl Strategy {
    #[must_use]
    pub fn for_language(lang: Lang) -> Self {
        if lang.grammar().is_some() && !lang.entity_node_kinds().is_empty() {
            Self::Grammar
        } else {
            Self::Window
        }
    }
}

struct ChunkCtx<'a> {
    source: &'a str,
    file_path: &'a str,
    lang: Lang,
    imports: &'a str,
    config: &'a ChunkerConfig,
}

impl ChunkCtx<'_> {
    #[allow(clippy::too_many_arguments)]
    fn push(
        &self,
        range: Range<usize>,
        lines: (usize, usize),
        kind: ChunkKind,
        node_type: String,
        entity_name: Option<String>,
        scope: &str,
        output: &mut Vec<Chunk>,
    ) {
        let code = self.source[range.clone()].to_string();
        let mut chunk = Chunk {
            id: ChunkId(String::new()),
            code,
            file_path: self.file_path.to_string(),
            language: self.lang,
            kind,
            node_type,
            entity_name,
            byte_range: range,
            line_range: lines,
            scope_chain: scope.to_string(),
            imports: self.imports.to_string(),
        };
        chunk.id = ChunkId::derive(
            self.file_path,
            lines,
            kind,
            &contextualize_for_embedding(&chunk),
        );
        output.push(chunk);
    }
}

/// Split a source file into chunks ordered by start offset.
///
/// Never fails: a missing grammar, a parse error, or an AST pass that yields
/// nothing all fall back to line windows.
#[must_use]
pub fn chunk_file(source: &str, file_path: &str, lang: Lang, config: &ChunkerConfig) -> Vec<Chunk> {
    if Strategy::for_language(lang) == Strategy::Grammar {
        match chunk_with_grammar(source, file_path, lang, config) {
            Ok(chunks) if !chunks.is_empty() => return chunks,
            Ok(_) => {
                tracing::debug!(file = file_path, "AST pass produced no chunks, windowing");
            }
            Err(reason) => {
                tracing::debug!(file = file_path, %reason, "parse failed, windowing");
            }
        }
    }

    let ctx = ChunkCtx {
        source,
        file_path,
        lang,
        imports: "",
        config,
    };
    let mut chunks = Vec::new();
    window_range(&ctx, 0..source.len(), "", "window", &mut chunks);
    chunks
}

fn chunk_with_grammar(
    source: &str,
    file_path: &str,
    lang: Lang,
    config: &ChunkerConfig,
) -> Result<Vec<Chunk>, String> {
    let grammar = lang
        .grammar()
        .ok_or_else(|| format!("no grammar for {lang}"))?;

    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| format!("set_language failed: {e}"))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| "parser returned no tree".to_string())?;
    let root = tree.root_node();
    if root.has_error() {
        return Err("syntax error".into());
    }

    let imports = extract_imports(source, &root, lang);
    let ctx = ChunkCtx {
        source,
        file_path,
        lang,
        imports: &imports,
        config,
    };
    let mut chunks = Vec::new();
    chunk_children(&ctx, &root, "", &mut chunks);
    Ok(chunks)
}

/// Pending run of non-entity siblings.
#[derive(Default)]
struct Batch<'t> {
    nodes: Vec<Node<'t>>,
    size: usize,
}

impl<'t> Batch<'t> {
    fn push(&mut self, node: Node<'t>, source: &str) {
        self.size += non_ws_len(&source[node.byte_range()]);
        self.nodes.push(node);
    }

    fn flush(&mut self, ctx: &ChunkCtx<'_>, scope: &str, output: &mut Vec<Chunk>) {
        let (Some(first), Some(last)) = (self.nodes.first(), self.nodes.last()) else {
            return;
        };
        if self.size >= ctx.config.min_size {
            let node_type = if self.nodes.len() == 1 {
                first.kind().to_string()
            } else {
                format!("{}x{}", first.kind(), self.nodes.len())
            };
            let entity_name = self
                .nodes
                .iter()
                .find_map(|n| extract_entity_name(n, ctx.source));
            ctx.push(
                first.start_byte()..last.end_byte(),
                (first.start_position().row + 1, last.end_position().row + 1),
                ChunkKind::Block,
                node_type,
                entity_name,
                scope,
                output,
            );
        }
        self.nodes.clear();
        self.size = 0;
    }
}

fn chunk_children(ctx: &ChunkCtx<'_>, parent: &Node, scope: &str, output: &mut Vec<Chunk>) {
    let entity_kinds = ctx.lang.entity_node_kinds();
    let comment_kinds = ctx.lang.comment_node_kinds();
    let mut batch = Batch::default();
    let mut leading: Vec<Node> = Vec::new();
    let child_count = u32::try_from(parent.named_child_count()).unwrap_or(u32::MAX);

    for i in 0..child_count {
        let Some(child) = parent.named_child(i) else {
            continue;
        };

        if comment_kinds.contains(&child.kind()) {
            leading.push(child);
            continue;
        }

        if entity_kinds.contains(&child.kind()) {
            batch.flush(ctx, scope, output);
            let start = leading.first().map_or(child.start_byte(), Node::start_byte);
            let size = non_ws_len(&ctx.source[start..child.end_byte()]);

            if size > ctx.config.max_size {
                for comment in leading.drain(..) {
                    batch.push(comment, ctx.source);
                }
                batch.flush(ctx, scope, output);
                let inner = extend_scope(scope, &child, ctx.source);
                split_oversized(ctx, &child, &inner, output);
                continue;
            }

            let start_row = leading
                .first()
                .map_or(child.start_position().row, |n| n.start_position().row);
            ctx.push(
                start..child.end_byte(),
                (start_row + 1, child.end_position().row + 1),
                classify(ctx.lang, &child),
                child.kind().to_string(),
                extract_entity_name(&child, ctx.source),
                scope,
                output,
            );
            leading.clear();
            continue;
        }

        for comment in leading.drain(..) {
            batch.push(comment, ctx.source);
        }

        let child_size = non_ws_len(&ctx.source[child.byte_range()]);
        if child_size > ctx.config.max_size {
            batch.flush(ctx, scope, output);
            split_oversized(ctx, &child, scope, output);
            continue;
        }

        if batch.size + child_size > ctx.config.target_size {
            batch.flush(ctx, scope, output);
        }
        batch.push(child, ctx.source);
    }

    for comment in leading.drain(..) {
        batch.push(comment, ctx.source);
    }
    batch.flush(ctx, scope, output);
}

fn split_oversized(ctx: &ChunkCtx<'_>, node: &Node, scope: &str, output: &mut Vec<Chunk>) {
    if node.named_child_count() == 0 {
        window_range(ctx, node.byte_range(), scope, node.kind(), output);
    } else {
        chunk_children(ctx, node, scope, output);
    }
}

/// Emit line windows over `range`, skipping whitespace-only windows.
fn window_range(
    ctx: &ChunkCtx<'_>,
    range: Range<usize>,
    scope: &str,
    node_type: &str,
    output: &mut Vec<Chunk>,
) {
    let base_row = ctx.source[..range.start].matches('\n').count();
    let spans = line_spans(&ctx.source[range.clone()], range.start);
    let size = ctx.config.window_lines.max(1);
    let step = size.saturating_sub(ctx.config.window_overlap).max(1);

    let mut first = 0;
    while first < spans.len() {
        let last = (first + size).min(spans.len()) - 1;
        let start = spans[first].start;
        let end = spans[last].end;
        if non_ws_len(&ctx.source[start..end]) > 0 {
            ctx.push(
                start..end,
                (base_row + first + 1, base_row + last + 1),
                ChunkKind::Window,
                node_type.to_string(),
                None,
                scope,
                output,
            );
        }
        if last + 1 == spans.len() {
            break;
        }
        first += step;
    }
}

/// Byte ranges of each line in `text`, offset by `base`, excluding newlines.
fn line_spans(text: &str, base: usize) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (pos, _) in text.match_indices('\n') {
        let end = if text[..pos].ends_with('\r') { pos - 1 } else { pos };
        spans.push(base + start..base + end);
        start = pos + 1;
    }
    if start < text.len() {
        spans.push(base + start..base + text.len());
    }
    spans
}

fn classify(lang: Lang, node: &Node) -> ChunkKind {
    let target = inner_declaration(node).unwrap_or(*node);
    let kind = target.kind();
    if lang.class_node_kinds().contains(&kind) {
        ChunkKind::Class
    } else if kind.contains("function") || kind.contains("method") || binds_function(&target) {
        ChunkKind::Function
    } else {
        ChunkKind::Block
    }
}

/// `const f = () => {}` and `let g = function () {}`.
fn binds_function(node: &Node) -> bool {
    if !matches!(node.kind(), "lexical_declaration" | "variable_declaration") {
        return false;
    }
    node.named_child(0)
        .filter(|declarator| declarator.kind() == "variable_declarator")
        .and_then(|declarator| declarator.child_by_field_name("value"))
        .is_some_and(|value| {
            matches!(
                value.kind(),
                "arrow_function" | "function_expression" | "function" | "generator_function"
            )
        })
}

/// The declaration wrapped by decorators or `export`.
fn inner_declaration<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    match node.kind() {
        "decorated_definition" => node.child_by_field_name("definition"),
        "export_statement" => node.child_by_field_name("declaration"),
        _ => None,
    }
}

fn non_ws_len(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

fn extract_imports(source: &str, root: &Node, lang: Lang) -> String {
    let import_kinds = lang.import_node_kinds();
    if import_kinds.is_empty() {
        return String::new();
    }

    let mut imports = String::new();
    let child_count = u32::try_from(root.named_child_count()).unwrap_or(u32::MAX);
    for i in 0..child_count {
        let Some(child) = root.named_child(i) else {
            continue;
        };
        if import_kinds.contains(&child.kind()) {
            imports.push_str(&source[child.byte_range()]);
            imports.push('\n');
        }
    }
    imports
}

fn extract_entity_name(node: &Node, source: &str) -> Option<String> {
    let target = inner_declaration(node).unwrap_or(*node);
    // impl_item names its subject via "type"; Go and JS declarations wrap a spec
    target
        .child_by_field_name("name")
        .or_else(|| target.child_by_field_name("type"))
        .or_else(|| {
            target
                .named_child(0)
                .and_then(|c| c.child_by_field_name("name"))
        })
        .map(|n| source[n.byte_range()].to_string())
}

fn extend_scope(parent_scope: &str, node: &Node, source: &str) -> String {
    let name = extract_entity_name(node, source).unwrap_or_else(|| node.kind().to_string());
    if parent_scope.is_empty() {
        name
    } else {
        format!("{parent_scope} > {name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ChunkerConfig {
        ChunkerConfig {
            min_size: 5,
            ..ChunkerConfig::default()
        }
    }

    fn assert_disjoint(chunks: &[Chunk]) {
        for pair in chunks.windows(2) {
            assert!(
                pair[0].byte_range.end <= pair[1].byte_range.start,
                "{:?} overlaps {:?}",
                pair[0].byte_range,
                pair[1].byte_range
            );
        }
    }

    #[test]
    fn windowed_without_grammar() {
        let source = "[package]\nname = \"test\"\nversion = \"0.1.0\"\n";
        let chunks = chunk_file(source, "Cargo.toml", Lang::Toml, &ChunkerConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Window);
        assert_eq!(chunks[0].line_range, (1, 3));
        assert_eq!(chunks[0].code, source.trim_end());
    }

    #[test]
    fn windows_cover_lines_without_overlap() {
        let source: String = (1..=10).map(|i| format!("line {i}\n")).collect();
        let config = ChunkerConfig {
            window_lines: 4,
            ..ChunkerConfig::default()
        };
        let chunks = chunk_file(&source, "notes.md", Lang::Markdown, &config);
        let ranges: Vec<_> = chunks.iter().map(|c| c.line_range).collect();
        assert_eq!(ranges, vec![(1, 4), (5, 8), (9, 10)]);
        assert_disjoint(&chunks);
    }

    #[test]
    fn window_overlap_is_opt_in() {
        let source: String = (1..=6).map(|i| format!("l{i}\n")).collect();
        let config = ChunkerConfig {
            window_lines: 4,
            window_overlap: 2,
            ..ChunkerConfig::default()
        };
        let chunks = chunk_file(&source, "a.sh", Lang::Bash, &config);
        let ranges: Vec<_> = chunks.iter().map(|c| c.line_range).collect();
        assert_eq!(ranges, vec![(1, 4), (3, 6)]);
    }

    #[test]
    fn blank_windows_skipped() {
        let chunks = chunk_file("\n\n   \n", "a.md", Lang::Markdown, &ChunkerConfig::default());
        assert!(chunks.is_empty());
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn each_function_is_own_chunk() {
        let source = "fn foo() {\n    1\n}\n\nfn bar() {\n    2\n}\n";
        let chunks = chunk_file(source, "src/lib.rs", Lang::Rust, &small_config());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].entity_name.as_deref(), Some("foo"));
        assert_eq!(chunks[0].kind, ChunkKind::Function);
        assert_eq!(chunks[0].line_range, (1, 3));
        assert_eq!(chunks[1].entity_name.as_deref(), Some("bar"));
        assert_eq!(chunks[1].line_range, (5, 7));
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn tiny_functions_not_dropped() {
        let source = "fn a() { 1 }\nfn b() { 2 }\n";
        let chunks = chunk_file(source, "src/main.rs", Lang::Rust, &ChunkerConfig::default());
        assert_eq!(chunks.len(), 2);
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn leading_comment_attached() {
        let source = "/// Adds.\nfn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n";
        let chunks = chunk_file(source, "src/lib.rs", Lang::Rust, &small_config());
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].code.starts_with("/// Adds."));
        assert_eq!(chunks[0].line_range.0, 1);
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn struct_and_impl_are_classes() {
        let source = "struct Foo;\n\nimpl Foo {\n    fn bar(&self) -> i32 {\n        42\n    }\n}\n";
        let chunks = chunk_file(source, "src/foo.rs", Lang::Rust, &small_config());
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Class));
        assert_eq!(chunks[1].entity_name.as_deref(), Some("Foo"));
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn imports_extracted_for_rust() {
        let source = "use std::io;\nuse std::path::Path;\n\nfn main() {\n    println!(\"hello\");\n}\n";
        let chunks = chunk_file(source, "src/main.rs", Lang::Rust, &small_config());
        let main = chunks
            .iter()
            .find(|c| c.entity_name.as_deref() == Some("main"))
            .unwrap();
        assert!(main.imports.contains("use std::io"));
        assert!(main.imports.contains("use std::path::Path"));
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn large_function_splits_with_scope() {
        let config = ChunkerConfig {
            target_size: 50,
            max_size: 100,
            min_size: 10,
            ..ChunkerConfig::default()
        };
        let mut source = String::from("fn big() {\n");
        for i in 0..30 {
            source.push_str(&format!("    let var{i} = {i};\n"));
        }
        source.push_str("}\n");

        let chunks = chunk_file(&source, "src/big.rs", Lang::Rust, &config);
        assert!(chunks.len() > 1, "expected split, got {}", chunks.len());
        assert!(chunks.iter().all(|c| c.scope_chain == "big"));
        assert_disjoint(&chunks);
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn scope_chain_nested_impl() {
        let config = ChunkerConfig {
            target_size: 30,
            max_size: 60,
            min_size: 5,
            ..ChunkerConfig::default()
        };
        let source = r"
impl MyStruct {
    fn method_one(&self) {
        let a = 1;
        let b = 2;
        let c = 3;
        let d = 4;
    }
}
";
        let chunks = chunk_file(source, "src/lib.rs", Lang::Rust, &config);
        assert!(chunks.iter().any(|c| c.scope_chain.starts_with("MyStruct")));
        assert_disjoint(&chunks);
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn syntax_error_falls_back_to_windows() {
        let source = "fn broken( {\n    let x = ;\n";
        let chunks = chunk_file(source, "src/lib.rs", Lang::Rust, &ChunkerConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Window);
        assert_eq!(chunks[0].language, Lang::Rust);
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn deterministic_ids() {
        let source = "fn test() { 42 }\n\nfn other() { 7 }\n";
        let c1 = chunk_file(source, "a.rs", Lang::Rust, &ChunkerConfig::default());
        let c2 = chunk_file(source, "a.rs", Lang::Rust, &ChunkerConfig::default());
        let ids1: Vec<_> = c1.iter().map(|c| (c.id.clone(), c.byte_range.clone())).collect();
        let ids2: Vec<_> = c2.iter().map(|c| (c.id.clone(), c.byte_range.clone())).collect();
        assert_eq!(ids1, ids2);
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn same_content_different_path_differs() {
        let source = "fn same() { 1 }\n";
        let a = chunk_file(source, "a.rs", Lang::Rust, &ChunkerConfig::default());
        let b = chunk_file(source, "b.rs", Lang::Rust, &ChunkerConfig::default());
        assert_ne!(a[0].id, b[0].id);
        assert_eq!(a[0].code, b[0].code);
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn one_char_edit_changes_one_id() {
        let before = "fn foo() {\n    1\n}\n\nfn bar() {\n    2\n}\n";
        let after = "fn foo() {\n    1\n}\n\nfn bar() {\n    3\n}\n";
        let a = chunk_file(before, "x.rs", Lang::Rust, &ChunkerConfig::default());
        let b = chunk_file(after, "x.rs", Lang::Rust, &ChunkerConfig::default());
        assert_eq!(a.len(), b.len());
        assert_eq!(a[0].id, b[0].id);
        assert_ne!(a[1].id, b[1].id);
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn import_edit_changes_every_id() {
        let before = "use std::io;\n\nfn foo() {\n    1\n}\n\nfn bar() {\n    2\n}\n";
        let after = "use std::collections::HashMap;\n\nfn foo() {\n    1\n}\n\nfn bar() {\n    2\n}\n";
        let a = chunk_file(before, "x.rs", Lang::Rust, &ChunkerConfig::default());
        let b = chunk_file(after, "x.rs", Lang::Rust, &ChunkerConfig::default());
        assert!(a.iter().any(|c| c.entity_name.as_deref() == Some("foo")));
        for chunk in &a {
            assert!(b.iter().all(|other| other.id != chunk.id));
        }
    }

    #[cfg(feature = "lang-js")]
    #[test]
    fn js_function_bindings_are_functions() {
        let source = "const add = (a, b) => {\n  return a + b;\n};\n\nexport const handle = function (req) {\n  return req.body;\n};\n\nconst LIMIT = 10;\n";
        let chunks = chunk_file(source, "app.js", Lang::JavaScript, &small_config());
        let kind_of = |name: &str| {
            chunks
                .iter()
                .find(|c| c.entity_name.as_deref() == Some(name))
                .map(|c| c.kind)
        };
        assert_eq!(kind_of("add"), Some(ChunkKind::Function));
        assert_eq!(kind_of("handle"), Some(ChunkKind::Function));
        assert_eq!(kind_of("LIMIT"), Some(ChunkKind::Block));
    }

    #[cfg(feature = "lang-python")]
    #[test]
    fn python_decorated_function_named() {
        let source = "@cache\ndef compute(x):\n    return x * 2\n\nclass Greeter:\n    def hello(self):\n        print('hi')\n";
        let chunks = chunk_file(source, "app.py", Lang::Python, &small_config());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].entity_name.as_deref(), Some("compute"));
        assert_eq!(chunks[0].kind, ChunkKind::Function);
        assert_eq!(chunks[1].kind, ChunkKind::Class);
    }

    #[cfg(feature = "lang-go")]
    #[test]
    fn go_type_declaration_named() {
        let source = "package main\n\ntype Server struct {\n\tAddr string\n}\n";
        let chunks = chunk_file(source, "main.go", Lang::Go, &small_config());
        let server = chunks
            .iter()
            .find(|c| c.kind == ChunkKind::Class)
            .unwrap();
        assert_eq!(server.entity_name.as_deref(), Some("Server"));
    }

    #[test]
    fn non_ws_len_counts_correctly() {
        assert_eq!(non_ws_len("fn  foo () { }"), 9);
        assert_eq!(non_ws_len(""), 0);
        assert_eq!(non_ws_len("   "), 0);
    }

    #[test]
    fn line_spans_strip_crlf() {
        let spans = line_spans("a\r\nbc\nd", 10);
        assert_eq!(spans, vec![10..11, 13..15, 16..17]);
    }

    #[test]
    fn chunk_kind_roundtrip() {
        for kind in [
            ChunkKind::Function,
            ChunkKind::Class,
            ChunkKind::Block,
            ChunkKind::Window,
        ] {
            assert_eq!(ChunkKind::from_id(kind.as_str()), Some(kind));
        }
    }
}
