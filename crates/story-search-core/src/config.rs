//! ============================================================================
//! Engine Configuration
//! ============================================================================
//! Read once at startup, never re-read per call. Values come from the
//! environment (`from_env`) or a JSON document; anything unset takes the
//! defaults below.
//!
//! | Variable                          | Field                          |
//! |-----------------------------------|--------------------------------|
//! | `STORY_SEARCH_EMBEDDING_MODEL`    | `embedding.model`              |
//! | `STORY_SEARCH_EMBEDDING_DIM`      | `embedding.dimension`          |
//! | `STORY_SEARCH_EMBEDDING_URL`      | `embedding.base_url`           |
//! | `OPENAI_API_KEY`                  | `embedding/extraction.api_key` |
//! | `STORY_SEARCH_EXTRACTION_MODEL`   | `extraction.model`             |
//! | `STORY_SEARCH_THRESHOLD`          | `search.default_threshold`     |
//! | `STORY_SEARCH_LIMIT`              | `search.default_limit`         |
//! | `STORY_SEARCH_CACHE_ENABLED`      | `cache.enabled`                |
//! | `STORY_SEARCH_CACHE_TTL_SECS`     | `cache.ttl_secs`               |
//! | `STORY_SEARCH_QDRANT_ENABLED`     | `qdrant.enabled`               |
//! | `QDRANT_URL` / `QDRANT_API_KEY`   | `qdrant.url` / `qdrant.api_key`|
//! | `STORY_SEARCH_COLLECTION`         | `qdrant.collection`            |
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, SearchError};

/// Default embedding model (OpenAI compatible)
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Expected embedding dimension for text-embedding-3-small
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

/// Default chat model for metadata extraction
pub const DEFAULT_EXTRACTION_MODEL: &str = "gpt-4o-mini";

pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Qdrant gRPC endpoint
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

pub const DEFAULT_COLLECTION: &str = "stories";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub embedding: EmbeddingConfig,
    pub extraction: ExtractionConfig,
    pub search: SearchConfig,
    pub cache: CacheConfig,
    pub qdrant: QdrantConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    /// No key selects the local hash embedding
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_EMBEDDING_DIM,
            api_key: None,
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub model: String,
    /// No key selects the heuristic extractor
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_EXTRACTION_MODEL.to_string(),
            api_key: None,
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub default_threshold: f32,
    /// Over-fetch factor applied when post-filtering will prune candidates
    pub candidate_multiplier: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            default_threshold: 0.3,
            candidate_multiplier: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            max_entries: 1000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    pub enabled: bool,
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub timeout_secs: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: DEFAULT_QDRANT_URL.to_string(),
            api_key: None,
            collection: DEFAULT_COLLECTION.to_string(),
            timeout_secs: 5,
        }
    }
}

impl EngineConfig {
    /// Build configuration from environment variables over the defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup (environment, test map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(model) = get("STORY_SEARCH_EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Some(dim) = get("STORY_SEARCH_EMBEDDING_DIM") {
            config.embedding.dimension = parse_var("STORY_SEARCH_EMBEDDING_DIM", &dim)?;
        }
        if let Some(url) = get("STORY_SEARCH_EMBEDDING_URL") {
            config.embedding.base_url = url;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            config.embedding.api_key = Some(key.clone());
            config.extraction.api_key = Some(key);
        }
        if let Some(model) = get("STORY_SEARCH_EXTRACTION_MODEL") {
            config.extraction.model = model;
        }
        if let Some(threshold) = get("STORY_SEARCH_THRESHOLD") {
            config.search.default_threshold = parse_var("STORY_SEARCH_THRESHOLD", &threshold)?;
        }
        if let Some(limit) = get("STORY_SEARCH_LIMIT") {
            config.search.default_limit = parse_var("STORY_SEARCH_LIMIT", &limit)?;
        }
        if let Some(enabled) = get("STORY_SEARCH_CACHE_ENABLED") {
            config.cache.enabled = parse_var("STORY_SEARCH_CACHE_ENABLED", &enabled)?;
        }
        if let Some(ttl) = get("STORY_SEARCH_CACHE_TTL_SECS") {
            config.cache.ttl_secs = parse_var("STORY_SEARCH_CACHE_TTL_SECS", &ttl)?;
        }
        if let Some(enabled) = get("STORY_SEARCH_QDRANT_ENABLED") {
            config.qdrant.enabled = parse_var("STORY_SEARCH_QDRANT_ENABLED", &enabled)?;
        }
        if let Some(url) = get("QDRANT_URL") {
            config.qdrant.url = url;
        }
        if let Some(key) = get("QDRANT_API_KEY") {
            config.qdrant.api_key = Some(key);
        }
        if let Some(collection) = get("STORY_SEARCH_COLLECTION") {
            config.qdrant.collection = collection;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(SearchError::InvalidInput(
                "embedding.dimension must be positive".into(),
            ));
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(SearchError::InvalidInput(
                "cache.ttl_secs must be positive when the cache is enabled".into(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.search.default_threshold) {
            return Err(SearchError::InvalidInput(format!(
                "search.default_threshold {} outside [-1, 1]",
                self.search.default_threshold
            )));
        }
        if self.search.default_limit == 0 {
            return Err(SearchError::InvalidInput(
                "search.default_limit must be positive".into(),
            ));
        }
        if self.qdrant.enabled && self.qdrant.collection.trim().is_empty() {
            return Err(SearchError::InvalidInput(
                "qdrant.collection must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SearchError::InvalidInput(format!("Invalid value for {}: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.embedding.dimension, DEFAULT_EMBEDDING_DIM);
        assert_eq!(config.search.default_limit, 10);
        assert!(config.cache.enabled);
        assert!(!config.qdrant.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("STORY_SEARCH_EMBEDDING_DIM", "256"),
            ("OPENAI_API_KEY", "sk-test"),
            ("STORY_SEARCH_CACHE_ENABLED", "false"),
            ("STORY_SEARCH_QDRANT_ENABLED", "true"),
            ("QDRANT_URL", "http://qdrant:6334"),
            ("STORY_SEARCH_THRESHOLD", "0.15"),
        ]))
        .unwrap();

        assert_eq!(config.embedding.dimension, 256);
        assert_eq!(config.embedding.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.extraction.api_key.as_deref(), Some("sk-test"));
        assert!(!config.cache.enabled);
        assert!(config.qdrant.enabled);
        assert_eq!(config.qdrant.url, "http://qdrant:6334");
        assert!((config.search.default_threshold - 0.15).abs() < f32::EPSILON);
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config = EngineConfig::from_lookup(lookup_from(&[("OPENAI_API_KEY", "  ")])).unwrap();
        assert!(config.embedding.api_key.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineConfig::from_lookup(lookup_from(&[("STORY_SEARCH_EMBEDDING_DIM", "0")])).is_err());
        assert!(EngineConfig::from_lookup(lookup_from(&[("STORY_SEARCH_LIMIT", "ten")])).is_err());
        assert!(EngineConfig::from_lookup(lookup_from(&[("STORY_SEARCH_THRESHOLD", "1.5")])).is_err());
    }

    #[test]
    fn test_from_json_partial_document() {
        let config = EngineConfig::from_json(
            r#"{"embedding": {"dimension": 64}, "cache": {"ttl_secs": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.embedding.dimension, 64);
        assert_eq!(config.embedding.model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.cache.ttl_secs, 5);
    }
}
