//! Storage Module
//!
//! SQLite-based storage layer with:
//! - FTS5 full-text search with OR-rewriting of natural-language queries
//! - Trigger-maintained lexical index (consistent at transaction boundaries)
//! - Ordered idempotent migrations

mod fts;
mod migrations;
mod sqlite;

pub use fts::rewrite_match_query;
pub use migrations::{apply_migrations, Migration, MIGRATIONS};
pub use sqlite::Store;
