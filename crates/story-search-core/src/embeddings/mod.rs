//! ============================================================================
//! Embedding Providers - Text to fixed-dimension vectors
//! ============================================================================
//! Two interchangeable strategies behind one trait:
//! - `OpenAiEmbeddingProvider`: OpenAI-compatible `/embeddings` API
//! - `HashEmbeddingProvider`: deterministic local n-gram hashing, used when
//!   no API key is configured and as the fallback when the API fails
//!
//! Every provider returns vectors of exactly `dimension()` components.
//! ============================================================================

mod hashed;
mod remote;

pub use hashed::{l2_normalize, HashEmbeddingProvider};
pub use remote::OpenAiEmbeddingProvider;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::EmbeddingConfig;
use crate::error::{Result, SearchError};

/// Contract every embedding strategy fulfils
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short identifier for logs and stats
    fn name(&self) -> &str;

    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Reject vectors whose length differs from the expected dimension
pub fn check_dimension(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(SearchError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Create the configured provider: the remote API when a key is present,
/// the local hash embedding otherwise
pub fn create_embedding_provider(config: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider> {
    match config.api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => {
            debug!("Using {} at {} for embeddings", config.model, config.base_url);
            Arc::new(OpenAiEmbeddingProvider::new_custom(
                key.to_string(),
                config.base_url.clone(),
                config.model.clone(),
                config.dimension,
            ))
        }
        None => {
            info!(
                "No embedding API key configured, using local hash embeddings (dim {})",
                config.dimension
            );
            Arc::new(HashEmbeddingProvider::new(config.dimension))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_selects_hash_without_key() {
        let provider = create_embedding_provider(&EmbeddingConfig::default());
        assert_eq!(provider.name(), "hash");
        assert_eq!(provider.dimension(), 1536);
    }

    #[test]
    fn test_factory_selects_remote_with_key() {
        let config = EmbeddingConfig {
            api_key: Some("sk-test".into()),
            dimension: 512,
            ..Default::default()
        };
        let provider = create_embedding_provider(&config);
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.dimension(), 512);
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(&[0.0; 4], 4).is_ok());
        assert!(matches!(
            check_dimension(&[0.0; 3], 4),
            Err(SearchError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[tokio::test]
    async fn test_default_batch_preserves_order() {
        let provider = HashEmbeddingProvider::new(64);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let batch = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], provider.embed("alpha").await.unwrap());
        assert_eq!(batch[1], provider.embed("beta").await.unwrap());
    }
}
