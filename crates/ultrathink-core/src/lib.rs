//! # Ultrathink Core
//!
//! Persistent memory engine for AI agents:
//!
//! - **Store**: SQLite records with a trigger-maintained FTS5 lexical index
//! - **Hybrid search**: lexical + semantic retrieval fused with a
//!   co-occurrence boost, degrading gracefully when services are down
//! - **Knowledge graph**: typed relationship edges with bounded BFS traversal
//! - **Ingestion**: transactional writes, content chunking, deduplicated
//!   bulk feeds
//! - **Analysis**: grounded Q&A, summaries, patterns, and temporal
//!   progressions with single-flight coalescing
//!
//! External collaborators (embedding service, vector index, chat service)
//! sit behind traits; Ollama and Qdrant clients ship in
//! [`services`], and tests substitute deterministic stubs.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use ultrathink_core::{Engine, StoreMemoryRequest, SearchRequest, UltrathinkConfig};
//!
//! let config = UltrathinkConfig::load_default()?;
//! let engine = Engine::from_config(&config)?;
//!
//! let stored = engine.ingestor().store(StoreMemoryRequest {
//!     content: "Go channels are typed conduits".into(),
//!     tags: vec!["go".into(), "concurrency".into()],
//!     ..Default::default()
//! }).await?;
//!
//! let results = engine.planner().search(&SearchRequest {
//!     query: Some("channel conduits".into()),
//!     ..Default::default()
//! }).await?;
//! ```

pub mod analyze;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod memory;
pub mod ratelimit;
pub mod search;
pub mod services;
pub mod session;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use analyze::{
    AnalysisFilters, AnalysisRequest, AnalysisResponse, Analyzer, PatternInsight, SingleFlight,
    TemporalPoint, Timeframe, PARSING_FAILED,
};
pub use config::{
    BucketConfig, DatabaseConfig, LoggingConfig, OllamaConfig, QdrantConfig, RateLimitConfig,
    RestApiConfig, SessionConfig, ToolBucketConfig, UltrathinkConfig,
};
pub use engine::Engine;
pub use error::{CoreError, Result};
pub use graph::{
    Graph, GraphEdge, GraphNode, GraphView, RelatedFilter, RelatedMemory, RelationshipRequest,
};
pub use ingest::{split_into_chunks, Ingestor, StoreMemoryRequest, StoredMemory};
pub use memory::{
    normalize_tags, AgentType, Category, Categorization, DataSource, Domain, DomainCount,
    IngestItem, IngestReport, Memory, MemoryFilters, MemoryPatch, MemoryStats, RelationType,
    Relationship, Session, SourceStatus, TagCount,
};
pub use ratelimit::RateLimiter;
pub use search::{
    fuse_scores, normalize_fts_score, MatchType, SearchHit, SearchPlanner, SearchRequest,
    SearchResponse, SearchType, TagOperator,
};
pub use services::{
    cosine_similarity, embedding_from_bytes, embedding_to_bytes, ChatMessage, ChatRole,
    ChatService, Embedder, OllamaChat, OllamaEmbedder, QdrantIndex, VectorFilter, VectorMatch,
    VectorMetadata, VectorStore,
};
pub use session::{derive_session_id, SessionStrategy, SessionTracker};
pub use storage::{rewrite_match_query, Store};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        AnalysisRequest, AnalysisResponse, Analyzer, CoreError, Engine, IngestItem, IngestReport,
        Memory, MemoryFilters, MemoryPatch, Relationship, Result, SearchHit, SearchPlanner,
        SearchRequest, SearchResponse, Store, StoreMemoryRequest, UltrathinkConfig,
    };
}
