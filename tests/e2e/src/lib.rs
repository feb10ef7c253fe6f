//! End-to-end test harness
//!
//! Deterministic stand-ins for the three external collaborators, so the
//! engine's full store → search → analyze flow runs hermetically:
//!
//! - [`StubEmbedder`]: bag-of-words hash embeddings; texts sharing words
//!   land near each other
//! - [`MemoryVectorStore`]: exact cosine scan over an in-memory map
//! - [`ScriptedChat`]: canned JSON responses with a call counter

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use ultrathink_core::{
    cosine_similarity, ChatMessage, ChatService, CoreError, Embedder, Engine, Result, Store,
    UltrathinkConfig, VectorFilter, VectorMatch, VectorMetadata, VectorStore,
};

/// Embedding dimension used by the stubs
pub const STUB_DIMENSIONS: usize = 16;

/// Deterministic bag-of-words embedder
pub struct StubEmbedder;

fn bucket_of(word: &str) -> usize {
    // FNV-1a over the lowercased word
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.to_lowercase().bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % STUB_DIMENSIONS as u64) as usize
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn dimensions(&self) -> usize {
        STUB_DIMENSIONS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; STUB_DIMENSIONS];
        for word in text.split_whitespace() {
            vector[bucket_of(word)] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        Ok(vector)
    }
}

/// Embedder that always fails, for degradation paths
pub struct DownEmbedder;

#[async_trait]
impl Embedder for DownEmbedder {
    fn dimensions(&self) -> usize {
        STUB_DIMENSIONS
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(CoreError::ServiceUnavailable("embedder down".to_string()))
    }
}

/// Exact-scan in-memory vector store
#[derive(Default)]
pub struct MemoryVectorStore {
    points: Mutex<HashMap<String, (Vec<f32>, VectorMetadata)>>,
}

impl MemoryVectorStore {
    pub fn len(&self) -> usize {
        self.points.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, id: &str, vector: &[f32], metadata: &VectorMetadata) -> Result<()> {
        self.points
            .lock()
            .unwrap()
            .insert(id.to_string(), (vector.to_vec(), metadata.clone()));
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorMatch>> {
        let points = self.points.lock().unwrap();
        let mut matches: Vec<VectorMatch> = points
            .iter()
            .filter(|(_, (_, metadata))| {
                filter
                    .session_id
                    .as_deref()
                    .is_none_or(|s| metadata.session_id.as_deref() == Some(s))
                    && filter
                        .domain
                        .as_deref()
                        .is_none_or(|d| metadata.domain.as_deref() == Some(d))
                    && filter.min_importance.is_none_or(|m| metadata.importance >= m)
            })
            .map(|(id, (stored, _))| VectorMatch {
                id: id.clone(),
                score: f64::from(cosine_similarity(vector, stored)).clamp(0.0, 1.0),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(k);
        Ok(matches)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.points.lock().unwrap().remove(id);
        Ok(())
    }
}

/// Chat service returning a fixed body and counting calls
pub struct ScriptedChat {
    body: String,
    calls: AtomicUsize,
}

impl ScriptedChat {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatService for ScriptedChat {
    async fn chat(&self, _messages: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.body.clone())
    }
}

/// Engine over a throwaway database with the full stub service set
pub fn engine_with_stubs(chat_body: &str) -> (Arc<Engine>, Arc<ScriptedChat>, Arc<MemoryVectorStore>, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(Store::new(dir.path().join("e2e.db")).unwrap());
    let vectors = Arc::new(MemoryVectorStore::default());
    let chat = Arc::new(ScriptedChat::new(chat_body));
    let engine = Engine::with_services(
        &UltrathinkConfig::default(),
        store,
        Some(Arc::new(StubEmbedder)),
        Some(Arc::clone(&vectors) as Arc<dyn VectorStore>),
        Some(Arc::clone(&chat) as Arc<dyn ChatService>),
    )
    .unwrap();
    (Arc::new(engine), chat, vectors, dir)
}

/// Engine with no external services at all (lexical-only)
pub fn engine_lexical_only() -> (Arc<Engine>, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(Store::new(dir.path().join("e2e.db")).unwrap());
    let engine =
        Engine::with_services(&UltrathinkConfig::default(), store, None, None, None).unwrap();
    (Arc::new(engine), dir)
}
