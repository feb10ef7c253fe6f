//! Search Module
//!
//! Hybrid retrieval over the store and the vector index:
//! - Lexical (FTS5/bm25 with normalized scores)
//! - Semantic (external vector index, degrades to lexical)
//! - Tag, date-range, and listing retrieval
//! - Hybrid fusion with a co-occurrence boost

mod planner;

pub use planner::{
    fuse_scores, normalize_fts_score, MatchType, SearchHit, SearchPlanner, SearchRequest,
    SearchResponse, SearchType, TagOperator, LIMIT_MAX,
};
