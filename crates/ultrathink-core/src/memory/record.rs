//! Memory record - the fundamental unit of storage
//!
//! Each memory carries content, provenance metadata, insertion-ordered tags,
//! and optional chunk linkage forming a tree rooted at level 0.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Importance bounds enforced at every boundary.
pub const IMPORTANCE_MIN: i32 = 1;
pub const IMPORTANCE_MAX: i32 = 10;

/// Default importance when the caller supplies none.
pub const IMPORTANCE_DEFAULT: i32 = 5;

/// A durable memory record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// The memory content
    pub content: String,
    /// Importance in [1,10], default 5
    pub importance: i32,
    /// Tags, insertion-ordered, deduplicated case-insensitively
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-form domain label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Owning agent session, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Provenance (URL, file, conversation, data source id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// When the memory was created
    pub created_at: DateTime<Utc>,
    /// When the memory was last modified (>= created_at)
    pub updated_at: DateTime<Utc>,
    /// Chunk tree parent; roots have none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_memory_id: Option<String>,
    /// Chunk tree level; 0 for roots, >= 1 for chunks
    #[serde(default)]
    pub chunk_level: i32,
    /// Position among siblings, for chunks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<i32>,
    /// Mirror of the externally indexed vector, for re-upsert after loss.
    /// Never serialized to callers.
    #[serde(skip)]
    pub embedding: Option<Vec<u8>>,
}

impl Default for Memory {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            content: String::new(),
            importance: IMPORTANCE_DEFAULT,
            tags: vec![],
            domain: None,
            session_id: None,
            source: None,
            created_at: now,
            updated_at: now,
            parent_memory_id: None,
            chunk_level: 0,
            chunk_index: None,
            embedding: None,
        }
    }
}

impl Memory {
    /// Create a new memory with the given content and defaults elsewhere
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Whether this memory is a chunk of a larger one
    pub fn is_chunk(&self) -> bool {
        self.parent_memory_id.is_some()
    }

    /// Case-insensitive tag membership
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Collapse duplicate tags comparing case-insensitively, keeping first
/// occurrence and original casing. Empty tags are dropped.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for tag in tags {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lower = trimmed.to_lowercase();
        if !seen.contains(&lower) {
            seen.push(lower);
            out.push(trimmed.to_string());
        }
    }
    out
}

/// Partial update for a memory. `None` fields are left untouched;
/// `updated_at` is always bumped by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryPatch {
    pub content: Option<String>,
    pub importance: Option<i32>,
    pub tags: Option<Vec<String>>,
    pub domain: Option<String>,
    pub source: Option<String>,
}

impl MemoryPatch {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.importance.is_none()
            && self.tags.is_none()
            && self.domain.is_none()
            && self.source.is_none()
    }
}

/// Predicate-combined listing filters. All present filters must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryFilters {
    pub session_id: Option<String>,
    pub domain: Option<String>,
    /// Memories must carry every listed tag (case-insensitive)
    pub tags: Vec<String>,
    pub min_importance: Option<i32>,
    pub max_importance: Option<i32>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Aggregate counters for the stats surface
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_memories: i64,
    pub total_relationships: i64,
    pub total_sessions: i64,
    pub total_domains: i64,
    pub total_data_sources: i64,
    pub memories_by_domain: Vec<DomainCount>,
    pub top_tags: Vec<TagCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainCount {
    pub domain: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}
