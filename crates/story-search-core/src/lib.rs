//! ============================================================================
//! Story Search Core - Semantic retrieval over short narrative documents
//! ============================================================================
//! Components, leaf-first:
//! - fuzzy: substring / word / partial-word matching for metadata filters
//! - embeddings: remote embedding API with a deterministic hash fallback
//! - cache: TTL memoization of query embeddings
//! - extract: story annotation and query parsing (LLM or heuristic)
//! - index: in-memory and Qdrant vector indexes behind `VectorIndex`
//! - engine: `StorySearchEngine`, the indexing and search facade
//! ============================================================================

pub mod cache;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod extract;
pub mod filter;
pub mod fuzzy;
pub mod index;
pub mod types;

#[cfg(test)]
mod test_support;

pub use cache::QueryCache;
pub use config::EngineConfig;
pub use embeddings::{EmbeddingProvider, HashEmbeddingProvider, OpenAiEmbeddingProvider};
pub use engine::{EngineStats, StorySearchEngine};
pub use error::{Result, SearchError};
pub use extract::{HeuristicExtractor, LlmMetadataExtractor, MetadataExtractor, QueryAnalysis};
pub use index::{cosine_similarity, InMemoryIndex, QdrantIndex, VectorIndex};
pub use types::{
    AgeConstraint, CoreMetadata, ExtractedMetadata, FilterField, Intent, SearchOptions,
    SearchParams, SearchResponse, SearchResult, StoryMetadata, StoryRecord,
};
