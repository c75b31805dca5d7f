//! ============================================================================
//! Metadata Extraction - Structured attributes from free text
//! ============================================================================
//! Two jobs, both best-effort:
//! - annotate a story (topics, profession, interests, age, ...)
//! - parse a search query into `SearchParams` plus the text to embed
//!
//! `LlmMetadataExtractor` asks a chat model for JSON; `HeuristicExtractor`
//! is the deterministic stand-in used without an API key. The engine turns
//! any `ExtractionFailed` into trivial defaults.
//! ============================================================================

mod heuristic;
mod llm;

pub use heuristic::HeuristicExtractor;
pub use llm::LlmMetadataExtractor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ExtractionConfig;
use crate::error::Result;
use crate::types::{ExtractedMetadata, SearchParams};

/// A parsed query: the text to embed and the constraints to apply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnalysis {
    pub rewritten_query: String,
    pub params: SearchParams,
}

impl QueryAnalysis {
    /// Embed the literal query, apply no constraints
    pub fn passthrough(query: &str) -> Self {
        Self {
            rewritten_query: query.to_string(),
            params: SearchParams::default(),
        }
    }
}

#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Annotate a story's text
    async fn extract_metadata(&self, text: &str, title: &str) -> Result<ExtractedMetadata>;

    /// Classify intent and pull constraints out of a query
    async fn extract_query_params(&self, query: &str) -> Result<QueryAnalysis>;
}

/// The LLM extractor when a key is configured, the heuristic one otherwise
pub fn create_metadata_extractor(config: &ExtractionConfig) -> Arc<dyn MetadataExtractor> {
    match config.api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => {
            debug!("Using {} for metadata extraction", config.model);
            Arc::new(LlmMetadataExtractor::new_custom(
                key.to_string(),
                config.base_url.clone(),
                config.model.clone(),
            ))
        }
        None => {
            info!("No extraction API key configured, using heuristic extractor");
            Arc::new(HeuristicExtractor::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_selection() {
        assert_eq!(
            create_metadata_extractor(&ExtractionConfig::default()).name(),
            "heuristic"
        );
        let config = ExtractionConfig {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        assert_eq!(create_metadata_extractor(&config).name(), "llm");
    }

    #[test]
    fn test_passthrough_has_no_constraints() {
        let analysis = QueryAnalysis::passthrough("anything");
        assert_eq!(analysis.rewritten_query, "anything");
        assert!(analysis.params.is_unconstrained());
    }
}
