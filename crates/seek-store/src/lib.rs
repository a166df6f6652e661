//! Vector storage for code search: a backend-neutral [`VectorStore`] trait
//! with Qdrant and in-memory implementations.

pub mod in_memory;
pub mod qdrant;
pub mod vector_store;

pub use in_memory::InMemoryVectorStore;
pub use qdrant::QdrantStore;
pub use vector_store::{
    BoxFuture, Distance, FieldCondition, FieldValue, ScoredVectorPoint, ScrollResult, VectorFilter,
    VectorPoint, VectorStore, VectorStoreError, rank_order,
};
