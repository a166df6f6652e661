//! Incremental semantic code index.
//!
//! Source files are split into AST-aligned chunks with tree-sitter, embedded
//! with a local model, and stored in a vector collection. The
//! [`IndexCoordinator`] keeps the collection in step with file changes and
//! answers natural-language queries with ranked code locations.

pub mod chunker;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod languages;
pub mod retry;
pub mod search;
pub mod state;
pub mod state_store;
pub mod watcher;

pub use chunker::{Chunk, ChunkId, ChunkKind, ChunkerConfig, chunk_file};
pub use config::{IndexerConfig, StoreConfig};
pub use coordinator::{FileOutcome, IndexCoordinator, IndexReport};
pub use error::{IndexError, Result};
pub use event::{ChangeEvent, ChangeKind, FileSource, FsSource, MemorySource};
pub use languages::Lang;
pub use search::{SearchFilter, SearchQuery, SearchResult, format_as_markdown};
pub use state::{FileStatus, Fingerprint};
pub use state_store::StateStore;
pub use watcher::IndexWatcher;
