//! Memory Types
//!
//! The entities the engine persists and retrieves:
//! - [`Memory`]: the primary content unit with tags, importance, and
//!   optional chunk linkage
//! - [`Relationship`]: a directed typed edge between two memories
//! - Categories, domains, sessions, and data sources

mod record;
mod relation;
mod session;

pub use record::{
    normalize_tags, DomainCount, Memory, MemoryFilters, MemoryPatch, MemoryStats, TagCount,
    IMPORTANCE_DEFAULT, IMPORTANCE_MAX, IMPORTANCE_MIN,
};
pub use relation::{Category, Categorization, Domain, RelationType, Relationship};
pub use session::{
    AgentType, DataSource, IngestItem, IngestReport, Session, SourceStatus,
};
