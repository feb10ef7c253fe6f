//! Ollama clients for embeddings and chat
//!
//! Thin reqwest wrappers over the Ollama REST API. One retry on transport
//! failure, then `ServiceUnavailable`; the caller decides how to degrade.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::{ChatMessage, ChatService, Embedder};
use crate::config::OllamaConfig;
use crate::error::{CoreError, Result};

fn build_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}

/// Embedding client against `POST {base}/api/embeddings`
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(config: &OllamaConfig) -> Self {
        Self {
            client: build_client(config.timeout_secs),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.embedding_model.clone(),
            dimensions: config.embedding_dimensions,
        }
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let endpoint = format!("{}/api/embeddings", self.base_url);
        let body = json!({ "model": self.model, "prompt": text });

        let response = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::ServiceUnavailable(format!("embedding service: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::ServiceUnavailable(format!(
                "embedding service returned {} from {endpoint}",
                response.status()
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CoreError::ServiceUnavailable(format!("embedding response: {e}")))?;

        if parsed.embedding.len() != self.dimensions {
            return Err(CoreError::Internal(format!(
                "embedding dimension mismatch: got {}, expected {}",
                parsed.embedding.len(),
                self.dimensions
            )));
        }
        Ok(parsed.embedding)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match self.request_embedding(text).await {
            Ok(vector) => Ok(vector),
            Err(CoreError::ServiceUnavailable(first)) => {
                warn!("embedding request failed, retrying once: {first}");
                self.request_embedding(text).await
            }
            Err(other) => Err(other),
        }
    }
}

/// Chat client against `POST {base}/api/chat`
#[derive(Debug, Clone)]
pub struct OllamaChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

impl OllamaChat {
    pub fn new(config: &OllamaConfig) -> Self {
        Self {
            client: build_client(config.timeout_secs),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.chat_model.clone(),
        }
    }
}

#[async_trait]
impl ChatService for OllamaChat {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let endpoint = format!("{}/api/chat", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "format": "json",
        });

        let response = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                CoreError::ServiceUnavailable(format!(
                    "chat service unavailable at {}: {e}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            return Err(CoreError::ServiceUnavailable(format!(
                "chat service returned {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CoreError::ServiceUnavailable(format!("chat response: {e}")))?;
        Ok(parsed.message.content)
    }
}
