//! A single-shot, non-streaming completions call: the extraction pipeline
//! builds a prompt (see `anamnesis_texture::extraction`) and hands it here
//! to execute. Trimmed down from a full chat-provider abstraction since
//! ingestion never streams and never uses tools.

use anamnesis_core::config::CompletionsProviderConfig;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{IngestError, Result};

const API_VERSION: &str = "2023-06-01";

/// True for connection/rate-limit/5xx failures worth retrying; false for
/// anything that indicates the prompt itself was rejected.
pub fn is_transient(err: &IngestError) -> bool {
    matches!(err, IngestError::Provider(msg) if msg.starts_with("transient:"))
}

#[async_trait]
pub trait CompletionsProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

pub struct AnthropicCompletions {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicCompletions {
    pub fn new(config: CompletionsProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key,
            base_url: config.base_url,
            model: config.model,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[async_trait]
impl CompletionsProvider for AnthropicCompletions {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.base_url);
        debug!(model = %self.model, "sending extraction prompt");

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 2048,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| IngestError::Provider(format!("transient: {e}")))?;

        let status = resp.status().as_u16();
        if status == 429 || status >= 500 {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "anthropic extraction call failed, transient");
            return Err(IngestError::Provider(format!("transient: {status} {text}")));
        }
        if !(200..300).contains(&status) {
            let text = resp.text().await.unwrap_or_default();
            return Err(IngestError::Provider(format!("{status} {text}")));
        }

        let parsed: ApiResponse = resp
            .json()
            .await
            .map_err(|e| IngestError::Provider(format!("transient: response parse failed: {e}")))?;

        parsed
            .content
            .into_iter()
            .find(|b| b.kind == "text")
            .and_then(|b| b.text)
            .ok_or_else(|| IngestError::Provider("no text block in completion".to_string()))
    }
}
