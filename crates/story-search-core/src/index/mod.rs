//! ============================================================================
//! Vector Index - Storage and similarity search over story vectors
//! ============================================================================
//! Two backends share the `VectorIndex` interface:
//! - `InMemoryIndex`: linear cosine scan, process lifetime, no push-down
//! - `QdrantIndex`: external ANN service, persistent, filters pushed down
//!
//! The engine only ever holds `Arc<dyn VectorIndex>`; the backend is picked
//! by configuration at construction time.
//! ============================================================================

mod memory;
mod qdrant;

pub use memory::InMemoryIndex;
pub use qdrant::{build_filter, point_id_for, QdrantIndex};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{FilterField, SearchParams, SearchResult, StoryRecord};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Backend identifier for logs and stats
    fn name(&self) -> &str;

    /// Vector length every record must have
    fn dimension(&self) -> usize;

    /// Constraint fields this backend evaluates itself in `search`.
    /// The engine post-filters every other constrained field.
    fn pushdown_fields(&self) -> &[FilterField] {
        &[]
    }

    /// Insert or fully replace a record
    async fn upsert(&self, record: StoryRecord) -> Result<()>;

    /// Insert or replace many records; rejected as a whole on invalid input
    async fn upsert_batch(&self, records: Vec<StoryRecord>) -> Result<()>;

    /// Up to `limit` records with similarity `>= threshold`, best first
    async fn search(
        &self,
        vector: &[f32],
        filters: &SearchParams,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>>;

    /// Direct lookup; an absent id is `Ok(None)`
    async fn get(&self, id: &str) -> Result<Option<StoryRecord>>;

    /// Delete by id; deleting an absent id succeeds
    async fn remove(&self, id: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    async fn count(&self) -> Result<usize>;

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// `dot(a, b) / (|a| * |b|)`; 0 when either magnitude is zero or the
/// lengths differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}
