//! ============================================================================
//! Qdrant Index - External ANN backend
//! ============================================================================
//! Stores stories as Qdrant points (cosine distance). Point ids are UUID v5
//! digests of the story id; the story itself travels as a JSON payload
//! string, with lower-cased copies of the filterable fields next to it.
//!
//! Filter push-down: one `should` group per constrained field (any listed
//! value, or the field being absent), all groups under `must`. Text fields
//! use full-text matching on word tokens, age a numeric range.
//! ============================================================================

use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, GetPointsBuilder, PointId, PointStruct,
    PointsIdsList, Range, SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::VectorIndex;
use crate::config::QdrantConfig;
use crate::embeddings::check_dimension;
use crate::error::{Result, SearchError};
use crate::filter::{candidate_values, normalize_gender};
use crate::types::{FilterField, SearchParams, SearchResult, StoryRecord};

/// Payload key holding the serialized story
const RECORD_KEY: &str = "record";

/// Payload key holding the original story id
const STORY_ID_KEY: &str = "story_id";

/// Story index backed by a Qdrant collection
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantIndex {
    /// Connect to Qdrant and make sure the collection exists
    pub async fn connect(config: &QdrantConfig, dimension: usize) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", config.url);

        let client = Qdrant::from_url(&config.url)
            .api_key(config.api_key.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| backend(format!("Failed to create Qdrant client: {}", e)))?;

        let index = Self {
            client,
            collection: config.collection.clone(),
            dimension,
        };
        index.ensure_collection().await?;

        Ok(index)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the collection and its payload indexes when missing
    async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(self.collection.as_str())
            .await
            .map_err(|e| backend(format!("Failed to check collection existence: {}", e)))?;

        if exists {
            debug!("Collection {} already exists", self.collection);
            return Ok(());
        }

        info!("Creating collection: {}", self.collection);
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(|e| backend(format!("Failed to create collection: {}", e)))?;

        for field in FilterField::ALL {
            let field_type = match field {
                FilterField::Age => FieldType::Integer,
                _ => FieldType::Text,
            };
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    field.payload_key(),
                    field_type,
                ))
                .await
                .map_err(|e| {
                    backend(format!(
                        "Failed to index payload field {}: {}",
                        field.payload_key(),
                        e
                    ))
                })?;
        }
        self.client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                &self.collection,
                STORY_ID_KEY,
                FieldType::Keyword,
            ))
            .await
            .map_err(|e| backend(format!("Failed to index story ids: {}", e)))?;

        info!("Collection {} created successfully", self.collection);
        Ok(())
    }

    fn to_point(&self, record: &StoryRecord) -> Result<PointStruct> {
        if record.id.trim().is_empty() {
            return Err(SearchError::InvalidInput("record id must not be empty".into()));
        }
        check_dimension(&record.embedding, self.dimension)?;
        Ok(PointStruct::new(
            point_id_for(&record.id),
            record.embedding.clone(),
            build_payload(record)?,
        ))
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn name(&self) -> &str {
        "qdrant"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn pushdown_fields(&self) -> &[FilterField] {
        &FilterField::ALL
    }

    async fn upsert(&self, record: StoryRecord) -> Result<()> {
        self.upsert_batch(vec![record]).await
    }

    async fn upsert_batch(&self, records: Vec<StoryRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let points = records
            .iter()
            .map(|r| self.to_point(r))
            .collect::<Result<Vec<_>>>()?;

        debug!("Upserting {} stories into {}", points.len(), self.collection);
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| backend(format!("Failed to upsert stories: {}", e)))?;
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        filters: &SearchParams,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        check_dimension(vector, self.dimension)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut request =
            SearchPointsBuilder::new(&self.collection, vector.to_vec(), limit as u64)
                .with_payload(true)
                .score_threshold(threshold);
        if let Some(filter) = build_filter(filters) {
            request = request.filter(filter);
        }

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| backend(format!("Failed to search stories: {}", e)))?;

        let results: Vec<SearchResult> = response
            .result
            .into_iter()
            .filter_map(|point| {
                let record = decode_record(&point.payload)?;
                Some(SearchResult {
                    record,
                    score: point.score,
                })
            })
            .collect();

        debug!("Qdrant returned {} stories", results.len());
        Ok(results)
    }

    async fn get(&self, id: &str) -> Result<Option<StoryRecord>> {
        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(&self.collection, vec![PointId::from(point_id_for(id))])
                    .with_payload(true),
            )
            .await
            .map_err(|e| backend(format!("Failed to get story: {}", e)))?;

        Ok(response
            .result
            .into_iter()
            .next()
            .and_then(|point| decode_record(&point.payload)))
    }

    async fn remove(&self, id: &str) -> Result<()> {
        debug!("Deleting story {}", id);
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList {
                        ids: vec![PointId::from(point_id_for(id))],
                    })
                    .wait(true),
            )
            .await
            .map_err(|e| backend(format!("Failed to delete story: {}", e)))?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        info!("Dropping collection {}", self.collection);
        self.client
            .delete_collection(self.collection.as_str())
            .await
            .map_err(|e| backend(format!("Failed to drop collection: {}", e)))?;
        self.ensure_collection().await
    }

    /// Exact point count; collection info only carries an estimate
    async fn count(&self) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(self.collection.as_str()).exact(true))
            .await
            .map_err(|e| backend(format!("Failed to count points: {}", e)))?;

        response
            .result
            .map(|r| r.count as usize)
            .ok_or_else(|| backend("Count response carried no result".to_string()))
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.health_check().await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Qdrant health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

/// Deterministic Qdrant point id for a story id
pub fn point_id_for(story_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, story_id.as_bytes()).to_string()
}

/// Translate parsed constraints into a Qdrant filter:
/// `must[ should[value1, value2, .., is_empty(field)], ... ]`
pub fn build_filter(params: &SearchParams) -> Option<Filter> {
    let groups: Vec<Condition> = params
        .constrained_fields()
        .into_iter()
        .map(|field| {
            let key = field.payload_key();
            let mut options: Vec<Condition> = match field {
                FilterField::Age => params
                    .age
                    .map(|age| {
                        let (min, max) = age.bounds();
                        Condition::range(
                            key,
                            Range {
                                gte: min.map(f64::from),
                                lte: max.map(f64::from),
                                ..Default::default()
                            },
                        )
                    })
                    .into_iter()
                    .collect(),
                FilterField::Gender => params
                    .gender
                    .iter()
                    .map(|g| Condition::matches_text(key, normalize_gender(g)))
                    .collect(),
                _ => params
                    .text_values(field)
                    .into_iter()
                    .map(|v| Condition::matches_text(key, v.trim().to_lowercase()))
                    .collect(),
            };
            options.push(Condition::is_empty(key));
            Condition::from(Filter::should(options))
        })
        .collect();

    if groups.is_empty() {
        None
    } else {
        Some(Filter::must(groups))
    }
}

fn build_payload(record: &StoryRecord) -> Result<HashMap<String, Value>> {
    let mut stored = record.clone();
    stored.embedding = Vec::new();

    let mut payload: HashMap<String, Value> = [
        (STORY_ID_KEY.to_string(), Value::from(record.id.clone())),
        (RECORD_KEY.to_string(), Value::from(serde_json::to_string(&stored)?)),
    ]
    .into_iter()
    .collect();

    if let Some(meta) = &record.metadata.extracted {
        for field in FilterField::ALL {
            let key = field.payload_key().to_string();
            match field {
                FilterField::Age => {
                    if let Some(age) = meta.age {
                        payload.insert(key, Value::from(age as i64));
                    }
                }
                FilterField::Gender => {
                    if let Some(gender) = meta.gender.as_deref().filter(|g| !g.trim().is_empty()) {
                        payload.insert(key, Value::from(normalize_gender(gender)));
                    }
                }
                _ => {
                    let values = candidate_values(meta, field);
                    if !values.is_empty() {
                        payload.insert(key, Value::from(values.join(" ").to_lowercase()));
                    }
                }
            }
        }
    }

    Ok(payload)
}

fn decode_record(payload: &HashMap<String, Value>) -> Option<StoryRecord> {
    let json = payload.get(RECORD_KEY).and_then(|v| v.as_str())?;
    match serde_json::from_str(json) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Skipping point with unreadable story payload: {}", e);
            None
        }
    }
}

fn backend(message: String) -> SearchError {
    SearchError::BackendUnavailable(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{annotated_story, paris_story};
    use crate::types::AgeConstraint;
    use qdrant_client::qdrant::condition::ConditionOneOf;

    fn group_sizes(filter: &Filter) -> Vec<usize> {
        filter
            .must
            .iter()
            .map(|c| match &c.condition_one_of {
                Some(ConditionOneOf::Filter(inner)) => inner.should.len(),
                other => panic!("expected nested filter, got {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_point_id_is_deterministic_uuid() {
        let a = point_id_for("story-42");
        assert_eq!(a, point_id_for("story-42"));
        assert_ne!(a, point_id_for("story-43"));
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_no_constraints_no_filter() {
        assert!(build_filter(&SearchParams::default()).is_none());
    }

    #[test]
    fn test_filter_is_and_of_or_groups() {
        let params = SearchParams {
            interests: vec!["art".into(), "travel".into()],
            profession: vec!["Engineer".into()],
            age: Some(AgeConstraint::Range {
                min: Some(25),
                max: Some(35),
            }),
            ..Default::default()
        };
        let filter = build_filter(&params).unwrap();
        // profession: value + is_empty; interests: two values + is_empty; age: range + is_empty
        assert_eq!(group_sizes(&filter), vec![2, 3, 2]);
        assert!(filter.should.is_empty());
    }

    #[test]
    fn test_payload_carries_lowercased_filter_fields() {
        let mut story = annotated_story("s1", "Software Engineer", &["Art", "Travel"], 34);
        story.embedding = vec![0.5; 4];
        let payload = build_payload(&story).unwrap();

        assert_eq!(
            payload.get("interests").and_then(|v| v.as_str()).map(String::as_str),
            Some("art travel")
        );
        assert_eq!(
            payload.get("profession").and_then(|v| v.as_str()).map(String::as_str),
            Some("software engineer")
        );
        assert_eq!(payload.get("age").and_then(|v| v.as_integer()), Some(34));
        assert!(payload.get("location").is_none());

        let decoded = decode_record(&payload).unwrap();
        assert_eq!(decoded.id, "s1");
        assert!(decoded.embedding.is_empty());
        assert_eq!(decoded.metadata, story.metadata);
    }

    #[test]
    fn test_payload_without_annotations() {
        let payload = build_payload(&paris_story()).unwrap();
        assert_eq!(payload.len(), 2);
        assert!(payload.contains_key(RECORD_KEY));
        assert!(payload.contains_key(STORY_ID_KEY));
    }

    // Integration tests require a running Qdrant instance
    // These are marked as ignored by default

    fn local_config(collection: &str) -> QdrantConfig {
        QdrantConfig {
            enabled: true,
            collection: collection.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_store_search_remove() {
        let index = QdrantIndex::connect(&local_config("stories_it_basic"), 4)
            .await
            .unwrap();
        index.clear().await.unwrap();

        let story = annotated_story("s1", "pilot", &["travel"], 40).with_embedding(vec![1.0, 0.0, 0.0, 0.0]);
        index.upsert(story).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);

        let results = index
            .search(&[1.0, 0.0, 0.0, 0.0], &SearchParams::default(), 5, 0.5)
            .await
            .unwrap();
        assert_eq!(results[0].record.id, "s1");
        assert!(index.get("s1").await.unwrap().is_some());

        index.remove("s1").await.unwrap();
        index.remove("s1").await.unwrap();
        assert!(index.get("s1").await.unwrap().is_none());
    }

    /// Push-down and post-filter paths must agree on word-level terms
    #[tokio::test]
    #[ignore]
    async fn test_pushdown_matches_post_filter() {
        use crate::filter::apply_filters;
        use crate::index::InMemoryIndex;

        let qdrant = QdrantIndex::connect(&local_config("stories_it_conformance"), 4)
            .await
            .unwrap();
        qdrant.clear().await.unwrap();
        let memory = InMemoryIndex::new(4);

        let mut bare = paris_story();
        bare.embedding = vec![0.7, 0.7, 0.0, 0.0];
        let fixtures = vec![
            annotated_story("a", "software engineer", &["art", "travel"], 29)
                .with_embedding(vec![1.0, 0.0, 0.0, 0.0]),
            annotated_story("b", "nurse", &["chess"], 41).with_embedding(vec![0.9, 0.1, 0.0, 0.0]),
            annotated_story("c", "Engineer", &["Travel"], 33).with_embedding(vec![0.8, 0.2, 0.0, 0.0]),
            bare,
        ];
        qdrant.upsert_batch(fixtures.clone()).await.unwrap();
        memory.upsert_batch(fixtures).await.unwrap();

        let cases = vec![
            SearchParams {
                interests: vec!["travel".into()],
                ..Default::default()
            },
            SearchParams {
                profession: vec!["engineer".into()],
                age: Some(AgeConstraint::Range {
                    min: Some(30),
                    max: None,
                }),
                ..Default::default()
            },
            SearchParams {
                interests: vec!["chess".into(), "art".into()],
                ..Default::default()
            },
        ];

        let query = [1.0, 0.0, 0.0, 0.0];
        for params in cases {
            let mut pushed: Vec<String> = qdrant
                .search(&query, &params, 10, 0.0)
                .await
                .unwrap()
                .into_iter()
                .map(|r| r.record.id)
                .collect();
            let candidates = memory.search(&query, &params, 10, 0.0).await.unwrap();
            let mut filtered: Vec<String> = apply_filters(candidates, &params, &[])
                .into_iter()
                .map(|r| r.record.id)
                .collect();
            pushed.sort();
            filtered.sort();
            assert_eq!(pushed, filtered, "diverged for {:?}", params);
        }
    }
}
