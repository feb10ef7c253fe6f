//! Ingestion pipeline
//!
//! The only component performing correlated writes: record + session in one
//! transaction, then a best-effort embed + vector upsert. A vector failure
//! never fails the write; the memory simply stays lexical-only.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::memory::{
    AgentType, IngestItem, IngestReport, Memory, IMPORTANCE_DEFAULT,
};
use crate::services::{embedding_to_bytes, Embedder, VectorMetadata, VectorStore};
use crate::session::SessionTracker;
use crate::storage::Store;

/// Content at or below this length stays a single memory
const CHUNK_THRESHOLD: usize = 2000;
/// Target chunk window, in characters
const CHUNK_WINDOW: usize = 1500;
/// Overlap between consecutive chunks
const CHUNK_OVERLAP: usize = 250;

/// Maximum accepted content size (matches the transport body limit)
const CONTENT_MAX_BYTES: usize = 1024 * 1024;

/// Request to store one memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreMemoryRequest {
    pub content: String,
    pub importance: Option<i32>,
    pub tags: Vec<String>,
    pub domain: Option<String>,
    pub session_id: Option<String>,
    pub source: Option<String>,
    pub agent_type: Option<AgentType>,
}

/// Outcome of a single store operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMemory {
    pub memory: Memory,
    /// Number of chunk children created for long content
    pub chunks: usize,
    /// True when the vector upsert was skipped or failed; the record is
    /// durable either way
    pub embedding_degraded: bool,
}

/// Split long content into overlapping windows at whitespace boundaries
/// where possible. Returns an empty vec for content under the threshold.
pub fn split_into_chunks(content: &str) -> Vec<String> {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= CHUNK_THRESHOLD {
        return vec![];
    }

    let step = CHUNK_WINDOW - CHUNK_OVERLAP;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + CHUNK_WINDOW).min(chars.len());
        if end < chars.len() {
            // Prefer breaking at whitespace within the last 10% of the window
            let floor = end.saturating_sub(CHUNK_WINDOW / 10);
            if let Some(cut) = (floor..end).rev().find(|&i| chars[i].is_whitespace()) {
                end = cut;
            }
        }
        let chunk: String = chars[start..end].iter().collect();
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        if end >= chars.len() {
            break;
        }
        start += step.max(1);
    }
    chunks
}

pub struct Ingestor {
    store: Arc<Store>,
    sessions: Arc<SessionTracker>,
    embedder: Option<Arc<dyn Embedder>>,
    vectors: Option<Arc<dyn VectorStore>>,
}

impl Ingestor {
    pub fn new(
        store: Arc<Store>,
        sessions: Arc<SessionTracker>,
        embedder: Option<Arc<dyn Embedder>>,
        vectors: Option<Arc<dyn VectorStore>>,
    ) -> Self {
        Self {
            store,
            sessions,
            embedder,
            vectors,
        }
    }

    fn validate(request: &StoreMemoryRequest) -> Result<()> {
        if request.content.trim().is_empty() {
            return Err(CoreError::validation("content must not be empty"));
        }
        if request.content.len() > CONTENT_MAX_BYTES {
            return Err(CoreError::PayloadTooLarge {
                size: request.content.len(),
                limit: CONTENT_MAX_BYTES,
            });
        }
        Ok(())
    }

    /// Store one memory: validate, write record + chunks + session in one
    /// transaction, then best-effort embedding.
    pub async fn store(&self, request: StoreMemoryRequest) -> Result<StoredMemory> {
        Self::validate(&request)?;

        let session_id = self.sessions.resolve(request.session_id.as_deref());
        let agent_type = request.agent_type.unwrap_or_default();

        let root = Memory {
            content: request.content.clone(),
            importance: request.importance.unwrap_or(IMPORTANCE_DEFAULT),
            tags: request.tags.clone(),
            domain: request.domain.clone(),
            session_id: session_id.clone(),
            source: request.source.clone(),
            ..Default::default()
        };

        let chunk_bodies = split_into_chunks(&request.content);
        let chunks: Vec<Memory> = chunk_bodies
            .iter()
            .enumerate()
            .map(|(index, body)| Memory {
                content: body.clone(),
                importance: root.importance,
                tags: root.tags.clone(),
                domain: root.domain.clone(),
                session_id: session_id.clone(),
                source: root.source.clone(),
                chunk_level: 1,
                chunk_index: Some(index as i32),
                ..Default::default()
            })
            .collect();
        let chunk_count = chunks.len();

        let root = self.store.create_memory_tree(root, chunks, agent_type)?;

        let embedding_degraded = self.embed_and_upsert(&root).await;

        Ok(StoredMemory {
            memory: root,
            chunks: chunk_count,
            embedding_degraded,
        })
    }

    /// Best-effort embed + upsert + mirror. Returns true when degraded.
    async fn embed_and_upsert(&self, memory: &Memory) -> bool {
        let (Some(embedder), Some(vectors)) = (&self.embedder, &self.vectors) else {
            return true;
        };

        let vector = match embedder.embed(&memory.content).await {
            Ok(v) => v,
            Err(err) => {
                warn!(memory_id = %memory.id, "embedding failed, memory stays lexical-only: {err}");
                return true;
            }
        };

        let metadata = VectorMetadata {
            session_id: memory.session_id.clone(),
            domain: memory.domain.clone(),
            importance: memory.importance,
        };
        if let Err(err) = vectors.upsert(&memory.id, &vector, &metadata).await {
            warn!(memory_id = %memory.id, "vector upsert failed, memory stays lexical-only: {err}");
            return true;
        }

        // Mirror the vector so the index can be rebuilt after loss
        if let Err(err) = self.store.set_embedding(&memory.id, &embedding_to_bytes(&vector)) {
            debug!(memory_id = %memory.id, "embedding mirror write failed: {err}");
        }
        false
    }

    /// Remove the memory everywhere: record (with cascades) and vector index.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete_memory(id)?;
        if let Some(vectors) = &self.vectors {
            if let Err(err) = vectors.delete(id).await {
                warn!(memory_id = %id, "vector delete failed after record delete: {err}");
            }
        }
        Ok(())
    }

    /// Bulk data-source ingestion, idempotent on `(source_id, external_id)`.
    pub async fn ingest_batch(
        &self,
        source_id: &str,
        items: Vec<IngestItem>,
        checkpoint_override: Option<String>,
    ) -> Result<IngestReport> {
        self.store
            .get_data_source(source_id)?
            .ok_or_else(|| CoreError::NotFound(format!("data source {source_id}")))?;

        let mut report = IngestReport::default();
        let mut last_external_id = None;

        for item in &items {
            report.processed += 1;
            last_external_id = Some(item.external_id.clone());

            match self.store.ingest_memory(source_id, item)? {
                Some(memory) => {
                    report.created += 1;
                    if self.embed_and_upsert(&memory).await {
                        debug!(memory_id = %memory.id, "ingested without vector");
                    }
                }
                None => {
                    report.duplicates_skipped += 1;
                }
            }
        }

        report.checkpoint = checkpoint_override.or(last_external_id);
        self.store.record_sync(
            source_id,
            report.processed,
            report.created,
            report.duplicates_skipped,
            report.checkpoint.as_deref(),
        )?;
        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================
