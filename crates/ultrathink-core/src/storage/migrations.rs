//! Database Migrations
//!
//! Ordered, idempotent schema migrations tracked in a version table.

use rusqlite::Connection;

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: memories, FTS5 index, triggers",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Relationship graph, categories, domains",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Agent sessions and performance metrics",
        up: MIGRATION_V3_UP,
    },
    Migration {
        version: 4,
        description: "Data sources, item dedup mapping, sync history",
        up: MIGRATION_V4_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Memory records plus the lexical index
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    importance INTEGER NOT NULL DEFAULT 5,
    tags TEXT NOT NULL DEFAULT '[]',
    domain TEXT,
    session_id TEXT,
    source TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    -- Chunk tree: roots have level 0 and no parent
    parent_memory_id TEXT REFERENCES memories(id),
    chunk_level INTEGER NOT NULL DEFAULT 0,
    chunk_index INTEGER,

    -- Mirror of the externally indexed vector
    embedding BLOB
);

CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at);
CREATE INDEX IF NOT EXISTS idx_memories_session ON memories(session_id);
CREATE INDEX IF NOT EXISTS idx_memories_domain ON memories(domain);
CREATE INDEX IF NOT EXISTS idx_memories_parent ON memories(parent_memory_id);

-- FTS5 virtual table for full-text search
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    id,
    content,
    tags,
    content='memories',
    content_rowid='rowid'
);

-- Triggers keep the FTS index consistent within the writing transaction
CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, id, content, tags)
    VALUES (NEW.rowid, NEW.id, NEW.content, NEW.tags);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, content, tags)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content, OLD.tags);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, content, tags)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content, OLD.tags);
    INSERT INTO memories_fts(rowid, id, content, tags)
    VALUES (NEW.rowid, NEW.id, NEW.content, NEW.tags);
END;

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// V2: Typed relationship edges and label taxonomies
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memory_relationships (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES memories(id),
    target_id TEXT NOT NULL REFERENCES memories(id),
    relation_type TEXT NOT NULL,
    strength REAL NOT NULL DEFAULT 0.5,
    context TEXT,
    auto_generated INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(source_id, target_id, relation_type)
);

CREATE INDEX IF NOT EXISTS idx_rel_source ON memory_relationships(source_id);
CREATE INDEX IF NOT EXISTS idx_rel_target ON memory_relationships(target_id);

CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    parent_id TEXT REFERENCES categories(id),
    description TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS memory_categorizations (
    memory_id TEXT NOT NULL REFERENCES memories(id),
    category_id TEXT NOT NULL REFERENCES categories(id),
    confidence REAL NOT NULL DEFAULT 1.0,
    reasoning TEXT,
    created_at TEXT NOT NULL,
    PRIMARY KEY (memory_id, category_id)
);

CREATE TABLE IF NOT EXISTS domains (
    name TEXT PRIMARY KEY,
    description TEXT,
    created_at TEXT NOT NULL
);
"#;

/// V3: Session correlation and operation metrics
const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS agent_sessions (
    id TEXT PRIMARY KEY,
    agent_type TEXT NOT NULL DEFAULT 'unknown',
    first_seen TEXT NOT NULL,
    last_accessed TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS performance_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL,
    duration_ms INTEGER NOT NULL,
    success INTEGER NOT NULL DEFAULT 1,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_metrics_operation ON performance_metrics(operation);
"#;

/// V4: External feeds and deduplicated bulk ingestion
const MIGRATION_V4_UP: &str = r#"
CREATE TABLE IF NOT EXISTS data_sources (
    id TEXT PRIMARY KEY,
    source_type TEXT NOT NULL,
    config TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL DEFAULT 'active',
    last_cursor TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS data_source_items (
    source_id TEXT NOT NULL REFERENCES data_sources(id),
    external_id TEXT NOT NULL,
    memory_id TEXT,
    ingested_at TEXT NOT NULL,
    PRIMARY KEY (source_id, external_id)
);

CREATE TABLE IF NOT EXISTS data_source_sync_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id TEXT NOT NULL REFERENCES data_sources(id),
    processed INTEGER NOT NULL,
    created INTEGER NOT NULL,
    duplicates_skipped INTEGER NOT NULL,
    checkpoint TEXT,
    synced_at TEXT NOT NULL
);
"#;

/// Apply all pending migrations to the connection.
pub fn apply_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        tracing::info!(
            version = migration.version,
            description = migration.description,
            "Applying migration"
        );
        conn.execute_batch(migration.up)?;
        conn.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.version, chrono::Utc::now().to_rfc3339()],
        )?;
    }

    Ok(())
}
