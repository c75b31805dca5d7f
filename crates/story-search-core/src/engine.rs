//! ============================================================================
//! Story Search Engine - Orchestrates indexing and retrieval
//! ============================================================================
//! One search runs ParseQuery -> Embed -> Retrieve -> Filter -> Rank -> Return.
//! Collaborators are injected; the engine owns no global state.
//!
//! Degraded paths never fail a call:
//! - provider failure: local hash embedding
//! - extraction failure: trivial metadata / unconstrained query
//! - backend failure: the in-memory mirror (when configured)
//!
//! Each degradation is logged with `warn!` and counted in `EngineStats`.
//! ============================================================================

use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::QueryCache;
use crate::config::EngineConfig;
use crate::embeddings::{
    check_dimension, create_embedding_provider, EmbeddingProvider, HashEmbeddingProvider,
};
use crate::error::{Result, SearchError};
use crate::extract::{create_metadata_extractor, MetadataExtractor, QueryAnalysis};
use crate::filter::apply_filters;
use crate::index::{InMemoryIndex, QdrantIndex, VectorIndex};
use crate::types::{
    ExtractedMetadata, FilterField, SearchOptions, SearchParams, SearchResponse, SearchResult,
    StoryRecord,
};

/// Snapshot of engine state and degradation counters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub backend: String,
    pub embedder: String,
    pub extractor: String,
    pub dimension: usize,
    pub indexed: usize,
    pub mirrored: bool,
    pub cache_size: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub provider_fallbacks: u64,
    pub extraction_fallbacks: u64,
    pub backend_fallbacks: u64,
}

#[derive(Debug, Default)]
struct Counters {
    provider_fallbacks: AtomicU64,
    extraction_fallbacks: AtomicU64,
    backend_fallbacks: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Semantic story search over a pluggable vector index
pub struct StorySearchEngine {
    config: EngineConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    fallback_embedder: HashEmbeddingProvider,
    extractor: Arc<dyn MetadataExtractor>,
    cache: QueryCache,
    index: Arc<dyn VectorIndex>,
    /// Write-through copy of the primary index, served when it fails
    mirror: Option<InMemoryIndex>,
    counters: Counters,
}

impl StorySearchEngine {
    /// Assemble an engine from explicit collaborators
    pub fn new(
        config: EngineConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn MetadataExtractor>,
        index: Arc<dyn VectorIndex>,
    ) -> Result<Self> {
        config.validate()?;
        if embedder.dimension() != index.dimension() {
            return Err(SearchError::DimensionMismatch {
                expected: index.dimension(),
                actual: embedder.dimension(),
            });
        }

        let dimension = index.dimension();
        Ok(Self {
            cache: QueryCache::new(&config.cache),
            fallback_embedder: HashEmbeddingProvider::new(dimension),
            config,
            embedder,
            extractor,
            index,
            mirror: None,
            counters: Counters::default(),
        })
    }

    /// Mirror every write into an in-memory index so searches survive a
    /// primary backend outage
    pub fn with_mirror(mut self) -> Self {
        self.mirror = Some(InMemoryIndex::new(self.index.dimension()));
        self
    }

    /// Engine over the in-memory index with configured providers
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        let dimension = config.embedding.dimension;
        Self::new(
            config.clone(),
            create_embedding_provider(&config.embedding),
            create_metadata_extractor(&config.extraction),
            Arc::new(InMemoryIndex::new(dimension)),
        )
    }

    /// Build everything from configuration. An unreachable Qdrant degrades
    /// to the in-memory index instead of failing startup.
    pub async fn from_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        if !config.qdrant.enabled {
            info!("Using in-memory vector index");
            return Self::in_memory(config);
        }

        let connect = QdrantIndex::connect(&config.qdrant, config.embedding.dimension);
        let limit = Duration::from_secs(config.qdrant.timeout_secs);
        match bounded(limit, connect, || {
            SearchError::BackendUnavailable(format!("Qdrant connect timed out after {:?}", limit))
        })
        .await
        {
            Ok(qdrant) => {
                info!(
                    "Using Qdrant collection {} at {}",
                    qdrant.collection(),
                    config.qdrant.url
                );
                Ok(Self::new(
                    config.clone(),
                    create_embedding_provider(&config.embedding),
                    create_metadata_extractor(&config.extraction),
                    Arc::new(qdrant),
                )?
                .with_mirror())
            }
            Err(e) => {
                warn!("Qdrant unavailable, falling back to in-memory index: {}", e);
                let engine = Self::in_memory(config)?;
                Counters::bump(&engine.counters.backend_fallbacks, 1);
                Ok(engine)
            }
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn backend_name(&self) -> &str {
        self.index.name()
    }

    // ------------------------------------------------------------------------
    // Indexing
    // ------------------------------------------------------------------------

    /// Index one story, computing its embedding and metadata when absent.
    /// Returns the story id (assigned when the record had none).
    pub async fn add_story(&self, mut record: StoryRecord) -> Result<String> {
        if !record.embedding.is_empty() {
            check_dimension(&record.embedding, self.dimension())?;
        }
        if record.id.trim().is_empty() {
            record.id = uuid::Uuid::new_v4().to_string();
            debug!("Assigned id {} to story '{}'", record.id, record.title());
        }

        if record.embedding.is_empty() {
            record.embedding = self.embed_or_fallback(&record.embedding_text()).await;
        }
        if record.metadata.extracted.is_none() {
            record.metadata.extracted = Some(self.annotate(&record).await);
        }

        let id = record.id.clone();
        if let Some(mirror) = &self.mirror {
            mirror.upsert(record.clone()).await?;
        }
        let result = self
            .on_backend("upsert", self.index.upsert(record))
            .await;
        self.absorb_write_failure("upsert", result)?;

        info!("Indexed story {}", id);
        Ok(id)
    }

    /// Index many stories. Supplied embeddings are validated up front; a
    /// failed embedding or extraction degrades that item only.
    pub async fn add_stories(&self, mut records: Vec<StoryRecord>) -> Result<Vec<String>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        for record in &records {
            if !record.embedding.is_empty() {
                check_dimension(&record.embedding, self.dimension())?;
            }
        }
        for record in &mut records {
            if record.id.trim().is_empty() {
                record.id = uuid::Uuid::new_v4().to_string();
            }
        }

        self.embed_missing(&mut records).await;

        for record in &mut records {
            if record.metadata.extracted.is_none() {
                let extracted = self.annotate(record).await;
                record.metadata.extracted = Some(extracted);
            }
        }

        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        if let Some(mirror) = &self.mirror {
            mirror.upsert_batch(records.clone()).await?;
        }
        let result = self
            .on_backend("upsert_batch", self.index.upsert_batch(records))
            .await;
        self.absorb_write_failure("upsert_batch", result)?;

        info!("Indexed {} stories", ids.len());
        Ok(ids)
    }

    /// Delete a story; deleting an unknown id succeeds
    pub async fn remove_story(&self, id: &str) -> Result<()> {
        if let Some(mirror) = &self.mirror {
            mirror.remove(id).await?;
        }
        let result = self.on_backend("remove", self.index.remove(id)).await;
        self.absorb_write_failure("remove", result)?;
        debug!("Removed story {}", id);
        Ok(())
    }

    /// Drop every indexed story
    pub async fn clear(&self) -> Result<()> {
        if let Some(mirror) = &self.mirror {
            mirror.clear().await?;
        }
        let result = self.on_backend("clear", self.index.clear()).await;
        self.absorb_write_failure("clear", result)?;
        info!("Cleared story index");
        Ok(())
    }

    pub async fn count(&self) -> Result<usize> {
        match self.on_backend("count", self.index.count()).await {
            Ok(count) => Ok(count),
            Err(e) => match &self.mirror {
                Some(mirror) if e.is_recoverable() => {
                    self.note_backend_fallback("count", &e);
                    mirror.count().await
                }
                _ => Err(e),
            },
        }
    }

    /// Direct lookup; an unknown id is `Ok(None)`
    pub async fn get_story(&self, id: &str) -> Result<Option<StoryRecord>> {
        match self.on_backend("get", self.index.get(id)).await {
            Ok(record) => Ok(record),
            Err(e) => match &self.mirror {
                Some(mirror) if e.is_recoverable() => {
                    self.note_backend_fallback("get", &e);
                    mirror.get(id).await
                }
                _ => Err(e),
            },
        }
    }

    // ------------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------------

    /// Ranked stories for a free-text query
    pub async fn search(&self, query: &str, options: SearchOptions) -> Result<SearchResponse> {
        if query.trim().is_empty() {
            return Err(SearchError::InvalidInput("query must not be empty".into()));
        }
        let limit = options.limit.unwrap_or(self.config.search.default_limit);
        let threshold = options
            .threshold
            .unwrap_or(self.config.search.default_threshold);
        if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
            return Err(SearchError::InvalidInput(format!(
                "threshold {} outside [-1, 1]",
                threshold
            )));
        }
        // Reject bad caller filters before spending a model call
        SearchParams::default().apply_overrides(&options.filters)?;

        // ParseQuery
        let analysis = self.parse_query(query).await;
        let rewritten_query = analysis.rewritten_query;
        let mut params = analysis.params;
        params.apply_overrides(&options.filters)?;
        if let Some(intent) = options.intent {
            params.intent = intent;
        }

        // An unknown count never short-circuits; retrieval decides
        let counted = match self.count().await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Count failed during search: {}", e);
                None
            }
        };
        let total_indexed = counted.unwrap_or(0);
        if counted == Some(0) || limit == 0 {
            return Ok(SearchResponse {
                results: Vec::new(),
                total_indexed,
                results_found: 0,
                rewritten_query,
                params,
            });
        }

        // Embed
        let vector = self.query_embedding(&rewritten_query).await;

        // Retrieve
        let (candidates, pushed_down) = self
            .retrieve(&vector, &params, limit, threshold, counted)
            .await?;

        // Filter
        let mut results = apply_filters(candidates, &params, pushed_down);

        // Rank (stable: ties keep retrieval order)
        results.sort_by(|a, b| b.score.total_cmp(&a.score));

        // Return
        results.truncate(limit);
        debug!(
            "Search '{}' ({} intent) returned {} of {} indexed",
            rewritten_query,
            params.intent,
            results.len(),
            total_indexed
        );

        Ok(SearchResponse {
            results_found: results.len(),
            results,
            total_indexed,
            rewritten_query,
            params,
        })
    }

    /// Candidates from the primary index, or from the mirror when the
    /// primary fails. Also returns the fields already evaluated.
    async fn retrieve(
        &self,
        vector: &[f32],
        params: &SearchParams,
        limit: usize,
        threshold: f32,
        total_indexed: Option<usize>,
    ) -> Result<(Vec<SearchResult>, &[FilterField])> {
        let pushdown = self.index.pushdown_fields();
        let constrained = params.constrained_fields();
        let needs_post_filter = constrained.iter().any(|f| !pushdown.contains(f));
        let over_fetch = limit.saturating_mul(self.config.search.candidate_multiplier.max(1));

        let fetch = match total_indexed {
            _ if !needs_post_filter => limit,
            Some(total) if pushdown.is_empty() => total.max(limit),
            _ => over_fetch,
        };

        let primary = self
            .on_backend("search", self.index.search(vector, params, fetch, threshold))
            .await;

        match primary {
            Ok(results) => Ok((results, pushdown)),
            Err(e) if e.is_recoverable() => {
                self.note_backend_fallback("search", &e);
                let nothing_pushed: &[FilterField] = &[];
                match &self.mirror {
                    Some(mirror) => {
                        let everything = mirror.count().await?.max(limit);
                        let results = mirror.search(vector, params, everything, threshold).await?;
                        Ok((results, nothing_pushed))
                    }
                    None => Ok((Vec::new(), nothing_pushed)),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Extract query parameters; a failure leaves the query unconstrained
    async fn parse_query(&self, query: &str) -> QueryAnalysis {
        let limit = Duration::from_secs(self.config.extraction.timeout_secs);
        let parsed = bounded(limit, self.extractor.extract_query_params(query), || {
            SearchError::ExtractionFailed(format!("query parsing timed out after {:?}", limit))
        })
        .await;

        match parsed {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(
                    "Query extraction via {} failed, searching unconstrained: {}",
                    self.extractor.name(),
                    e
                );
                Counters::bump(&self.counters.extraction_fallbacks, 1);
                QueryAnalysis::passthrough(query)
            }
        }
    }

    /// Cached query embedding. Fallback vectors are not cached so the
    /// provider is retried on the next search.
    async fn query_embedding(&self, text: &str) -> Vec<f32> {
        if let Some(vector) = self.cache.get(text).await {
            return vector;
        }
        match self.embed_with_provider(text).await {
            Ok(vector) => {
                self.cache.set(text, vector.clone()).await;
                vector
            }
            Err(e) => self.fallback_embedding(text, &e),
        }
    }

    // ------------------------------------------------------------------------
    // Enrichment
    // ------------------------------------------------------------------------

    async fn embed_with_provider(&self, text: &str) -> Result<Vec<f32>> {
        let limit = Duration::from_secs(self.config.embedding.timeout_secs);
        let vector = bounded(limit, self.embedder.embed(text), || {
            SearchError::ProviderUnavailable(format!("embedding timed out after {:?}", limit))
        })
        .await?;
        check_dimension(&vector, self.dimension())?;
        Ok(vector)
    }

    async fn embed_or_fallback(&self, text: &str) -> Vec<f32> {
        match self.embed_with_provider(text).await {
            Ok(vector) => vector,
            Err(e) => self.fallback_embedding(text, &e),
        }
    }

    fn fallback_embedding(&self, text: &str, error: &SearchError) -> Vec<f32> {
        warn!(
            "Embedding via {} failed, using hash embedding: {}",
            self.embedder.name(),
            error
        );
        Counters::bump(&self.counters.provider_fallbacks, 1);
        self.fallback_embedder.embed_text(text)
    }

    /// Fill missing embeddings with one batch call, falling back per item
    async fn embed_missing(&self, records: &mut [StoryRecord]) {
        let missing: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.embedding.is_empty())
            .map(|(i, _)| i)
            .collect();
        if missing.is_empty() {
            return;
        }

        let texts: Vec<String> = missing.iter().map(|&i| records[i].embedding_text()).collect();
        let limit = Duration::from_secs(self.config.embedding.timeout_secs);
        let batch = bounded(limit, self.embedder.embed_batch(&texts), || {
            SearchError::ProviderUnavailable(format!("batch embedding timed out after {:?}", limit))
        })
        .await
        .and_then(|vectors| {
            if vectors.len() != texts.len() {
                return Err(SearchError::ProviderUnavailable(format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    vectors.len()
                )));
            }
            Ok(vectors)
        });

        match batch {
            Ok(vectors) => {
                for ((&i, text), vector) in missing.iter().zip(&texts).zip(vectors) {
                    records[i].embedding = match check_dimension(&vector, self.dimension()) {
                        Ok(()) => vector,
                        Err(e) => self.fallback_embedding(text, &e),
                    };
                }
            }
            Err(e) => {
                for (&i, text) in missing.iter().zip(&texts) {
                    records[i].embedding = self.fallback_embedding(text, &e);
                }
            }
        }
    }

    /// Extract story metadata; a failure yields the trivial annotation
    async fn annotate(&self, record: &StoryRecord) -> ExtractedMetadata {
        let limit = Duration::from_secs(self.config.extraction.timeout_secs);
        let core = &record.metadata.core;
        let extracted = bounded(
            limit,
            self.extractor.extract_metadata(&core.content, &core.title),
            || SearchError::ExtractionFailed(format!("extraction timed out after {:?}", limit)),
        )
        .await;

        match extracted {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(
                    "Metadata extraction for story {} via {} failed, using fallback: {}",
                    record.id,
                    self.extractor.name(),
                    e
                );
                Counters::bump(&self.counters.extraction_fallbacks, 1);
                ExtractedMetadata::fallback(&core.title)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Backend plumbing
    // ------------------------------------------------------------------------

    /// Bound a primary-index call by the backend timeout
    async fn on_backend<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let limit = Duration::from_secs(self.config.qdrant.timeout_secs);
        bounded(limit, fut, || {
            SearchError::BackendUnavailable(format!(
                "{} on {} timed out after {:?}",
                op,
                self.index.name(),
                limit
            ))
        })
        .await
    }

    /// A write the primary rejected for availability reasons is tolerated
    /// when the mirror already holds it
    fn absorb_write_failure(&self, op: &str, result: Result<()>) -> Result<()> {
        match result {
            Err(e) if e.is_recoverable() && self.mirror.is_some() => {
                self.note_backend_fallback(op, &e);
                Ok(())
            }
            other => other,
        }
    }

    fn note_backend_fallback(&self, op: &str, error: &SearchError) {
        warn!(
            "{} on {} backend failed, using in-memory fallback: {}",
            op,
            self.index.name(),
            error
        );
        Counters::bump(&self.counters.backend_fallbacks, 1);
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// Whether the primary backend answers; failures read as unhealthy
    pub async fn health_check(&self) -> bool {
        match self.on_backend("health_check", self.index.health_check()).await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!("Health check on {} failed: {}", self.index.name(), e);
                false
            }
        }
    }

    pub async fn stats(&self) -> EngineStats {
        let (cache_hits, cache_misses) = self.cache.hit_stats();
        EngineStats {
            backend: self.index.name().to_string(),
            embedder: self.embedder.name().to_string(),
            extractor: self.extractor.name().to_string(),
            dimension: self.dimension(),
            indexed: self.count().await.unwrap_or(0),
            mirrored: self.mirror.is_some(),
            cache_size: self.cache.size().await,
            cache_hits,
            cache_misses,
            provider_fallbacks: self.counters.provider_fallbacks.load(Ordering::Relaxed),
            extraction_fallbacks: self.counters.extraction_fallbacks.load(Ordering::Relaxed),
            backend_fallbacks: self.counters.backend_fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// Run `fut` under a deadline, mapping an elapsed deadline to `on_timeout`
async fn bounded<T, F, E>(limit: Duration, fut: F, on_timeout: E) -> Result<T>
where
    F: Future<Output = Result<T>>,
    E: FnOnce() -> SearchError,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}
