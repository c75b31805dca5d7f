//! In-process vector index: linear scan with cosine similarity.
//!
//! Records keep their first-insertion position, so equal scores rank in
//! insertion order. One `RwLock` makes upsert/remove/clear exclusive with
//! each other and with searches.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{cosine_similarity, VectorIndex};
use crate::embeddings::check_dimension;
use crate::error::{Result, SearchError};
use crate::types::{SearchParams, SearchResult, StoryRecord};

#[derive(Default)]
struct Inner {
    records: Vec<StoryRecord>,
    positions: HashMap<String, usize>,
}

impl Inner {
    fn upsert(&mut self, record: StoryRecord) {
        match self.positions.get(&record.id) {
            Some(&pos) => self.records[pos] = record,
            None => {
                self.positions.insert(record.id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(pos) = self.positions.remove(id) else {
            return false;
        };
        self.records.remove(pos);
        for record in &self.records[pos..] {
            if let Some(p) = self.positions.get_mut(&record.id) {
                *p -= 1;
            }
        }
        true
    }
}

pub struct InMemoryIndex {
    dimension: usize,
    inner: RwLock<Inner>,
}

impl InMemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn validate(&self, record: &StoryRecord) -> Result<()> {
        if record.id.trim().is_empty() {
            return Err(SearchError::InvalidInput("record id must not be empty".into()));
        }
        check_dimension(&record.embedding, self.dimension)
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn name(&self) -> &str {
        "memory"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, record: StoryRecord) -> Result<()> {
        self.validate(&record)?;
        debug!("Upserting story {} into memory index", record.id);
        self.inner.write().await.upsert(record);
        Ok(())
    }

    async fn upsert_batch(&self, records: Vec<StoryRecord>) -> Result<()> {
        for record in &records {
            self.validate(record)?;
        }
        let mut inner = self.inner.write().await;
        let count = records.len();
        for record in records {
            inner.upsert(record);
        }
        debug!("Upserted {} stories into memory index", count);
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        _filters: &SearchParams,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        check_dimension(vector, self.dimension)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let inner = self.inner.read().await;
        let mut scored: Vec<SearchResult> = inner
            .records
            .iter()
            .filter_map(|record| {
                let score = cosine_similarity(vector, &record.embedding);
                (score >= threshold).then(|| SearchResult {
                    record: record.clone(),
                    score,
                })
            })
            .collect();
        drop(inner);

        // sort_by is stable: ties keep insertion order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn get(&self, id: &str) -> Result<Option<StoryRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.positions.get(id).map(|&pos| inner.records[pos].clone()))
    }

    async fn remove(&self, id: &str) -> Result<()> {
        if !self.inner.write().await.remove(id) {
            debug!("Remove of unknown story {} ignored", id);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.records.clear();
        inner.positions.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.inner.read().await.records.len())
    }
}
