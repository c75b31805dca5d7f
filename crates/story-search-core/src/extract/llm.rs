//! ============================================================================
//! LLM Metadata Extractor - Structured attributes via chat completions
//! ============================================================================
//! Prompts an OpenAI-compatible `/chat/completions` endpoint for a JSON
//! object and deserializes it. The model may wrap the JSON in a fenced
//! block and may emit `null` for unknown fields; both are tolerated.
//! Anything else (transport, status, unparsable reply) is `ExtractionFailed`.
//! ============================================================================

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{MetadataExtractor, QueryAnalysis};
use crate::error::{Result, SearchError};
use crate::types::{ExtractedMetadata, SearchParams};

/// Stories longer than this are cut before prompting
const MAX_PROMPT_CHARS: usize = 6000;

const METADATA_PROMPT: &str = "You annotate personal stories. Return ONLY a JSON object with these keys \
(omit or null any you cannot infer):\n\
topics (array of strings, max 5), summary (array of 1-2 short sentences), profession (string), \
interests (array), age (integer), gender (\"male\" or \"female\"), experiences (array), \
personalityTraits (array), skills (array), location (string), relationshipStatus (string), \
education (string), genres (array), emotionalTone (array), narrativeStyle (string), \
charactersDescription (string).";

const QUERY_PROMPT: &str = "You parse search queries over personal stories. Return ONLY a JSON object with keys:\n\
intent (one of \"general\", \"professional\", \"connection\", \"dating\"), \
rewrittenQuery (the query without age phrases, suitable for semantic search), \
profession (string), interests (array), age (integer, or object {\"min\": n, \"max\": n}), \
gender (\"male\" or \"female\"), location (string), experiences (array), \
personalityTraits (array), skills (array), keywords (array).\n\
Only include constraints the query actually states.";

/// Metadata extractor backed by a chat model
pub struct LlmMetadataExtractor {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmMetadataExtractor {
    pub fn new_custom(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Call the chat endpoint and return the first choice's text
    async fn call_api(&self, system: &str, user: &str) -> Result<String> {
        debug!("Calling extraction model with {} chars", user.len());

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: Some(0.1),
            max_tokens: Some(1024),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| failed(format!("Failed to call extraction API: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("Extraction API error {}: {}", status, body)));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("Failed to parse API response: {}", e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| failed("No response from extraction API".to_string()))
    }
}

#[async_trait]
impl MetadataExtractor for LlmMetadataExtractor {
    fn name(&self) -> &str {
        "llm"
    }

    async fn extract_metadata(&self, text: &str, title: &str) -> Result<ExtractedMetadata> {
        let body: String = text.chars().take(MAX_PROMPT_CHARS).collect();
        let reply = self
            .call_api(METADATA_PROMPT, &format!("Title: {}\n\n{}", title, body))
            .await?;
        let metadata: ExtractedMetadata = parse_reply(&reply)?;
        info!(
            "Extracted metadata for '{}' ({} topics)",
            title,
            metadata.topics.len()
        );
        Ok(metadata)
    }

    async fn extract_query_params(&self, query: &str) -> Result<QueryAnalysis> {
        let reply = self.call_api(QUERY_PROMPT, query).await?;
        let parsed: QueryReply = parse_reply(&reply)?;
        let rewritten_query = parsed
            .rewritten_query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .unwrap_or_else(|| query.to_string());
        debug!(
            "Parsed query as {} intent, rewritten to '{}'",
            parsed.params.intent, rewritten_query
        );
        Ok(QueryAnalysis {
            rewritten_query,
            params: parsed.params,
        })
    }
}

/// JSON body of a fenced block if there is one, else the trimmed reply
fn extract_json_block(response: &str) -> &str {
    if let Some(start) = response.find("```") {
        let after_start = &response[start + 3..];
        // Skip language identifier if present
        let body_start = after_start.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_start[body_start..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }

    let trimmed = response.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(open), Some(close)) if open < close => &trimmed[open..=close],
        _ => trimmed,
    }
}

/// Drop `null` members so missing-vs-null never matters to serde
fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(strip_nulls)
                .collect(),
        ),
        other => other,
    }
}

fn parse_reply<T: serde::de::DeserializeOwned>(reply: &str) -> Result<T> {
    let value: Value = serde_json::from_str(extract_json_block(reply))
        .map_err(|e| failed(format!("Model reply is not JSON: {}", e)))?;
    serde_json::from_value(strip_nulls(value))
        .map_err(|e| failed(format!("Model reply has unexpected shape: {}", e)))
}

fn failed(message: String) -> SearchError {
    SearchError::ExtractionFailed(message)
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryReply {
    #[serde(default)]
    rewritten_query: Option<String>,
    #[serde(flatten)]
    params: SearchParams,
}
