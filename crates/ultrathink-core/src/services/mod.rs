//! External service contracts
//!
//! The engine delegates embedding, vector similarity, and chat generation to
//! external collaborators. Each sits behind a trait so transports wire real
//! clients and tests wire deterministic stubs.

mod ollama;
mod qdrant;

pub use ollama::{OllamaChat, OllamaEmbedder};
pub use qdrant::QdrantIndex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Text to fixed-dimension vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Vector dimension this embedder produces
    fn dimensions(&self) -> usize;

    /// Embed one text. Unavailability surfaces as `ServiceUnavailable`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch. The default embeds sequentially and fails on the
    /// first unavailable item; services with a native batch endpoint
    /// override this.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// One similarity match from the vector index
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    /// Similarity in [0,1], higher is better
    pub score: f64,
}

/// Payload stored alongside each vector, sufficient for post-filtering
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub session_id: Option<String>,
    pub domain: Option<String>,
    pub importance: i32,
}

/// Filter applied inside the vector index at query time
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub session_id: Option<String>,
    pub domain: Option<String>,
    pub min_importance: Option<i32>,
}

/// Vector similarity index keyed by memory id
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, id: &str, vector: &[f32], metadata: &VectorMetadata) -> Result<()>;

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorMatch>>;

    async fn delete(&self, id: &str) -> Result<()>;
}

/// Role in a chat conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

/// A single message sent to the chat service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Chat completion service. Output is untrusted text the analyzer parses
/// defensively.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Serialize a vector into the byte mirror stored on the memory row
/// (little-endian f32 sequence).
pub fn embedding_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Deserialize the byte mirror back into a vector. Returns `None` on a
/// malformed length.
pub fn embedding_from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

/// Cosine similarity between two vectors of equal length
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_bytes_roundtrip() {
        let vector = vec![0.5_f32, -1.25, 3.0];
        let bytes = embedding_to_bytes(&vector);
        assert_eq!(bytes.len(), 12);
        assert_eq!(embedding_from_bytes(&bytes), Some(vector));
    }

    #[test]
    fn test_embedding_from_bytes_rejects_ragged() {
        assert_eq!(embedding_from_bytes(&[1, 2, 3]), None);
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![1.0_f32, 0.0];
        let c = vec![0.0_f32, 1.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &c).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[]), 0.0);
    }
}
