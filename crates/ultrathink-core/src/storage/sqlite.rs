//! SQLite Storage Implementation
//!
//! One durable file owns every record plus the FTS5 lexical index. The index
//! is projected by triggers, so a record write and its index row commit or
//! roll back together.
//!
//! Connection discipline: a writer and a reader connection, each behind a
//! mutex, so the store is `Send + Sync` behind `Arc` and the process keeps a
//! single-writer / shared-reader discipline.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::memory::{
    normalize_tags, AgentType, Category, Categorization, DataSource, Domain, DomainCount,
    IngestItem, Memory, MemoryFilters, MemoryPatch, MemoryStats, RelationType, Relationship,
    Session, SourceStatus, TagCount,
};
use crate::storage::fts::rewrite_match_query;

/// Hard cap on rows pulled from the FTS index before post-filtering
const FTS_CANDIDATE_CAP: usize = 1000;

/// Columns selected for every memory row, in `row_to_memory` order
const MEMORY_COLUMNS: &str = "id, content, importance, tags, domain, session_id, source, \
     created_at, updated_at, parent_memory_id, chunk_level, chunk_index, embedding";

/// Durable record store
pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

/// Format a timestamp with fixed-width fractional seconds so lexicographic
/// ordering of the stored TEXT matches chronological ordering.
fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let tags_json: String = row.get(3)?;
    let created: String = row.get(7)?;
    let updated: String = row.get(8)?;
    Ok(Memory {
        id: row.get(0)?,
        content: row.get(1)?,
        importance: row.get(2)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        domain: row.get(4)?,
        session_id: row.get(5)?,
        source: row.get(6)?,
        created_at: parse_ts(&created)?,
        updated_at: parse_ts(&updated)?,
        parent_memory_id: row.get(9)?,
        chunk_level: row.get(10)?,
        chunk_index: row.get(11)?,
        embedding: row.get(12)?,
    })
}

fn row_to_relationship(row: &rusqlite::Row<'_>) -> rusqlite::Result<Relationship> {
    let type_name: String = row.get(3)?;
    let created: String = row.get(7)?;
    Ok(Relationship {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        relation_type: RelationType::parse_name(&type_name).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown relation type: {type_name}").into(),
            )
        })?,
        strength: row.get(4)?,
        context: row.get(5)?,
        auto_generated: row.get::<_, i64>(6)? != 0,
        created_at: parse_ts(&created)?,
    })
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let agent: String = row.get(1)?;
    let first: String = row.get(2)?;
    let last: String = row.get(3)?;
    let metadata: String = row.get(5)?;
    Ok(Session {
        id: row.get(0)?,
        agent_type: AgentType::parse_name(&agent),
        first_seen: parse_ts(&first)?,
        last_accessed: parse_ts(&last)?,
        active: row.get::<_, i64>(4)? != 0,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
    })
}

fn row_to_source(row: &rusqlite::Row<'_>) -> rusqlite::Result<DataSource> {
    let config: String = row.get(2)?;
    let status: String = row.get(3)?;
    let created: String = row.get(5)?;
    Ok(DataSource {
        id: row.get(0)?,
        source_type: row.get(1)?,
        config: serde_json::from_str(&config).unwrap_or(serde_json::Value::Null),
        status: SourceStatus::parse_name(&status).unwrap_or_default(),
        last_cursor: row.get(4)?,
        created_at: parse_ts(&created)?,
    })
}

fn placeholders(count: usize) -> String {
    std::iter::repeat("?")
        .take(count)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Store {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) the store at the given path.
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
        })
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| CoreError::Internal("writer lock poisoned".to_string()))
    }

    fn reader(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| CoreError::Internal("reader lock poisoned".to_string()))
    }

    // ========================================================================
    // MEMORIES
    // ========================================================================

    fn validate_memory(memory: &Memory) -> Result<()> {
        if memory.content.trim().is_empty() {
            return Err(CoreError::validation("content must not be empty"));
        }
        if !(crate::memory::IMPORTANCE_MIN..=crate::memory::IMPORTANCE_MAX)
            .contains(&memory.importance)
        {
            return Err(CoreError::Validation(format!(
                "importance {} outside [{}, {}]",
                memory.importance,
                crate::memory::IMPORTANCE_MIN,
                crate::memory::IMPORTANCE_MAX
            )));
        }
        match (&memory.parent_memory_id, memory.chunk_level) {
            (Some(_), level) if level < 1 => Err(CoreError::validation(
                "chunk memories must have chunk_level >= 1",
            )),
            (None, level) if level != 0 => Err(CoreError::validation(
                "root memories must have chunk_level 0",
            )),
            _ => Ok(()),
        }
    }

    fn insert_memory_tx(tx: &rusqlite::Transaction<'_>, memory: &Memory) -> Result<()> {
        if let Some(parent) = &memory.parent_memory_id {
            let exists: Option<String> = tx
                .query_row("SELECT id FROM memories WHERE id = ?1", params![parent], |r| {
                    r.get(0)
                })
                .optional()?;
            if exists.is_none() {
                return Err(CoreError::Validation(format!(
                    "parent memory not found: {parent}"
                )));
            }
        }
        let tags_json =
            serde_json::to_string(&memory.tags).unwrap_or_else(|_| "[]".to_string());
        tx.execute(
            "INSERT INTO memories (
                id, content, importance, tags, domain, session_id, source,
                created_at, updated_at, parent_memory_id, chunk_level, chunk_index, embedding
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                memory.id,
                memory.content,
                memory.importance,
                tags_json,
                memory.domain,
                memory.session_id,
                memory.source,
                fmt_ts(memory.created_at),
                fmt_ts(memory.updated_at),
                memory.parent_memory_id,
                memory.chunk_level,
                memory.chunk_index,
                memory.embedding,
            ],
        )?;
        Ok(())
    }

    fn prepare_for_insert(memory: &mut Memory) {
        if memory.id.is_empty() {
            memory.id = Uuid::new_v4().to_string();
        }
        memory.tags = normalize_tags(&memory.tags);
        if memory.updated_at < memory.created_at {
            memory.updated_at = memory.created_at;
        }
    }

    /// Insert a single memory. The lexical index row is projected by trigger
    /// inside the same transaction.
    pub fn create_memory(&self, mut memory: Memory) -> Result<Memory> {
        Self::prepare_for_insert(&mut memory);
        Self::validate_memory(&memory)?;

        let mut conn = self.writer()?;
        let tx = conn.transaction()?;
        Self::insert_memory_tx(&tx, &memory)?;
        tx.commit()?;
        Ok(memory)
    }

    /// Atomic write of a root memory, its chunk children, and the owning
    /// session row. Either all rows land or none do.
    pub fn create_memory_tree(
        &self,
        mut root: Memory,
        mut chunks: Vec<Memory>,
        agent_type: AgentType,
    ) -> Result<Memory> {
        Self::prepare_for_insert(&mut root);
        Self::validate_memory(&root)?;
        for chunk in chunks.iter_mut() {
            Self::prepare_for_insert(chunk);
            chunk.parent_memory_id = Some(root.id.clone());
        }

        let now = fmt_ts(Utc::now());
        let mut conn = self.writer()?;
        let tx = conn.transaction()?;

        if let Some(session_id) = &root.session_id {
            tx.execute(
                "INSERT INTO agent_sessions (id, agent_type, first_seen, last_accessed, active, metadata)
                 VALUES (?1, ?2, ?3, ?3, 1, '{}')
                 ON CONFLICT(id) DO UPDATE SET
                     last_accessed = MAX(last_accessed, excluded.last_accessed),
                     active = 1",
                params![session_id, agent_type.as_str(), now],
            )?;
        }

        Self::insert_memory_tx(&tx, &root)?;
        for chunk in &chunks {
            Self::validate_memory(chunk)?;
            Self::insert_memory_tx(&tx, chunk)?;
        }

        tx.commit()?;
        Ok(root)
    }

    pub fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        let conn = self.reader()?;
        let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1");
        let memory = conn
            .query_row(&sql, params![id], row_to_memory)
            .optional()?;
        Ok(memory)
    }

    pub fn require_memory(&self, id: &str) -> Result<Memory> {
        self.get_memory(id)?
            .ok_or_else(|| CoreError::NotFound(format!("memory {id}")))
    }

    /// Patch the provided fields and bump `updated_at` (strictly increasing,
    /// even for an empty patch).
    pub fn update_memory(&self, id: &str, patch: &MemoryPatch) -> Result<Memory> {
        let mut memory = self.require_memory(id)?;

        if let Some(content) = &patch.content {
            if content.trim().is_empty() {
                return Err(CoreError::validation("content must not be empty"));
            }
            memory.content = content.clone();
        }
        if let Some(importance) = patch.importance {
            memory.importance = importance;
        }
        if let Some(tags) = &patch.tags {
            memory.tags = normalize_tags(tags);
        }
        if let Some(domain) = &patch.domain {
            memory.domain = Some(domain.clone());
        }
        if let Some(source) = &patch.source {
            memory.source = Some(source.clone());
        }
        Self::validate_memory(&memory)?;

        let mut updated_at = Utc::now();
        if updated_at <= memory.updated_at {
            updated_at = memory.updated_at + chrono::Duration::microseconds(1);
        }
        memory.updated_at = updated_at;

        let tags_json =
            serde_json::to_string(&memory.tags).unwrap_or_else(|_| "[]".to_string());
        let conn = self.writer()?;
        let changed = conn.execute(
            "UPDATE memories SET content = ?2, importance = ?3, tags = ?4,
                 domain = ?5, source = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                memory.id,
                memory.content,
                memory.importance,
                tags_json,
                memory.domain,
                memory.source,
                fmt_ts(memory.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(CoreError::NotFound(format!("memory {id}")));
        }
        Ok(memory)
    }

    /// Store the vector mirror after an external upsert.
    pub fn set_embedding(&self, id: &str, bytes: &[u8]) -> Result<()> {
        let conn = self.writer()?;
        let changed = conn.execute(
            "UPDATE memories SET embedding = ?2 WHERE id = ?1",
            params![id, bytes],
        )?;
        if changed == 0 {
            return Err(CoreError::NotFound(format!("memory {id}")));
        }
        Ok(())
    }

    /// Ids of every descendant chunk, root excluded, children before parents
    /// reversed for safe deletion.
    fn descendant_ids(conn: &Connection, root: &str) -> Result<Vec<String>> {
        let mut all = Vec::new();
        let mut frontier = vec![root.to_string()];
        while let Some(parent) = frontier.pop() {
            let mut stmt =
                conn.prepare("SELECT id FROM memories WHERE parent_memory_id = ?1")?;
            let children: Vec<String> = stmt
                .query_map(params![parent], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?;
            for child in children {
                frontier.push(child.clone());
                all.push(child);
            }
        }
        Ok(all)
    }

    /// Atomic cascade: child chunks, incident edges, categorizations, then
    /// the memory itself. Repeat deletion returns `NotFound`.
    pub fn delete_memory(&self, id: &str) -> Result<()> {
        let mut conn = self.writer()?;
        let tx = conn.transaction()?;

        let exists: Option<String> = tx
            .query_row("SELECT id FROM memories WHERE id = ?1", params![id], |r| r.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(CoreError::NotFound(format!("memory {id}")));
        }

        let descendants = Self::descendant_ids(&tx, id)?;
        let mut ids = descendants.clone();
        ids.push(id.to_string());

        let marks = placeholders(ids.len());

        tx.execute(
            &format!("DELETE FROM memory_categorizations WHERE memory_id IN ({marks})"),
            rusqlite::params_from_iter(ids.iter()),
        )?;
        tx.execute(
            &format!(
                "DELETE FROM memory_relationships
                 WHERE source_id IN ({marks}) OR target_id IN ({marks})"
            ),
            rusqlite::params_from_iter(ids.iter().chain(ids.iter())),
        )?;
        tx.execute(
            &format!("UPDATE data_source_items SET memory_id = NULL WHERE memory_id IN ({marks})"),
            rusqlite::params_from_iter(ids.iter()),
        )?;
        // Deepest chunks first, root last, so the self-referential FK holds
        // throughout (discovery order is parent-before-child)
        for memory_id in descendants.iter().rev() {
            tx.execute("DELETE FROM memories WHERE id = ?1", params![memory_id])?;
        }
        tx.execute("DELETE FROM memories WHERE id = ?1", params![id])?;

        tx.commit()?;
        Ok(())
    }

    /// Predicate-combined listing, `created_at` descending.
    pub fn list_memories(&self, filters: &MemoryFilters) -> Result<Vec<Memory>> {
        let mut sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(session) = &filters.session_id {
            sql.push_str(" AND session_id = ?");
            args.push(Box::new(session.clone()));
        }
        if let Some(domain) = &filters.domain {
            sql.push_str(" AND domain = ?");
            args.push(Box::new(domain.clone()));
        }
        if let Some(min) = filters.min_importance {
            sql.push_str(" AND importance >= ?");
            args.push(Box::new(min));
        }
        if let Some(max) = filters.max_importance {
            sql.push_str(" AND importance <= ?");
            args.push(Box::new(max));
        }
        if let Some(after) = filters.created_after {
            sql.push_str(" AND created_at >= ?");
            args.push(Box::new(fmt_ts(after)));
        }
        if let Some(before) = filters.created_before {
            sql.push_str(" AND created_at <= ?");
            args.push(Box::new(fmt_ts(before)));
        }
        sql.push_str(" ORDER BY created_at DESC, id ASC");

        let conn = self.reader()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<Memory> = stmt
            .query_map(
                rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
                row_to_memory,
            )?
            .collect::<rusqlite::Result<_>>()?;

        // Tag subset filter compares case-insensitively, so it runs here
        // rather than in SQL
        let filtered: Vec<Memory> = rows
            .into_iter()
            .filter(|m| filters.tags.iter().all(|t| m.has_tag(t)))
            .collect();

        let offset = filters.offset.unwrap_or(0);
        let mut page: Vec<Memory> = filtered.into_iter().skip(offset).collect();
        if let Some(limit) = filters.limit {
            page.truncate(limit);
        }
        Ok(page)
    }

    pub fn count_memories(&self) -> Result<i64> {
        let conn = self.reader()?;
        let count = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Full-text search. Raw scores are bm25 ranks: negative, lower is
    /// better. The planner owns normalization.
    pub fn search_fts(
        &self,
        query: &str,
        filters: &MemoryFilters,
        limit: usize,
    ) -> Result<Vec<(Memory, f64)>> {
        let match_expr = rewrite_match_query(query);
        if match_expr.is_empty() {
            return Ok(vec![]);
        }

        let conn = self.reader()?;
        let qualified_cols = MEMORY_COLUMNS
            .split(", ")
            .map(|c| format!("m.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {qualified_cols}, bm25(memories_fts) AS rank
             FROM memories_fts
             JOIN memories m ON m.rowid = memories_fts.rowid
             WHERE memories_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<(Memory, f64)> = stmt
            .query_map(params![match_expr, FTS_CANDIDATE_CAP as i64], |row| {
                let memory = row_to_memory(row)?;
                let rank: f64 = row.get(13)?;
                Ok((memory, rank))
            })?
            .collect::<rusqlite::Result<_>>()?;

        let filtered: Vec<(Memory, f64)> = rows
            .into_iter()
            .filter(|(m, _)| {
                filters.session_id.as_deref().is_none_or(|s| m.session_id.as_deref() == Some(s))
                    && filters.domain.as_deref().is_none_or(|d| m.domain.as_deref() == Some(d))
                    && filters.created_after.is_none_or(|t| m.created_at >= t)
                    && filters.created_before.is_none_or(|t| m.created_at <= t)
                    && filters.tags.iter().all(|t| m.has_tag(t))
            })
            .take(limit)
            .collect();
        Ok(filtered)
    }

    /// Fetch memories by id, preserving the input order. Missing ids are
    /// silently skipped (the vector index may lag the record store).
    pub fn fetch_memories(&self, ids: &[String]) -> Result<Vec<Memory>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let conn = self.reader()?;
        let sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM memories WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<Memory> = stmt
            .query_map(rusqlite::params_from_iter(ids.iter()), row_to_memory)?
            .collect::<rusqlite::Result<_>>()?;

        let mut by_id: HashMap<String, Memory> =
            rows.into_iter().map(|m| (m.id.clone(), m)).collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    // ========================================================================
    // RELATIONSHIPS
    // ========================================================================

    /// Insert an edge; an identical (source, target, type) edge updates
    /// strength and context instead of duplicating.
    pub fn upsert_relationship(&self, mut rel: Relationship) -> Result<Relationship> {
        if rel.id.is_empty() {
            rel.id = Uuid::new_v4().to_string();
        }

        let mut conn = self.writer()?;
        let tx = conn.transaction()?;

        for endpoint in [&rel.source_id, &rel.target_id] {
            let exists: Option<String> = tx
                .query_row(
                    "SELECT id FROM memories WHERE id = ?1",
                    params![endpoint],
                    |r| r.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(CoreError::Validation(format!(
                    "relationship endpoint not found: {endpoint}"
                )));
            }
        }

        tx.execute(
            "INSERT INTO memory_relationships
                 (id, source_id, target_id, relation_type, strength, context, auto_generated, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(source_id, target_id, relation_type) DO UPDATE SET
                 strength = excluded.strength,
                 context = excluded.context",
            params![
                rel.id,
                rel.source_id,
                rel.target_id,
                rel.relation_type.as_str(),
                rel.strength,
                rel.context,
                rel.auto_generated as i64,
                fmt_ts(rel.created_at),
            ],
        )?;

        let stored = tx.query_row(
            "SELECT id, source_id, target_id, relation_type, strength, context, auto_generated, created_at
             FROM memory_relationships
             WHERE source_id = ?1 AND target_id = ?2 AND relation_type = ?3",
            params![rel.source_id, rel.target_id, rel.relation_type.as_str()],
            row_to_relationship,
        )?;
        tx.commit()?;
        Ok(stored)
    }

    /// Every edge incident to the memory, either direction.
    pub fn relationships_of(&self, memory_id: &str) -> Result<Vec<Relationship>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT id, source_id, target_id, relation_type, strength, context, auto_generated, created_at
             FROM memory_relationships
             WHERE source_id = ?1 OR target_id = ?1
             ORDER BY strength DESC",
        )?;
        let rows: Vec<Relationship> = stmt
            .query_map(params![memory_id], row_to_relationship)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    pub fn delete_relationship(&self, id: &str) -> Result<()> {
        let conn = self.writer()?;
        let changed = conn.execute(
            "DELETE FROM memory_relationships WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Err(CoreError::NotFound(format!("relationship {id}")));
        }
        Ok(())
    }

    pub fn count_relationships(&self) -> Result<i64> {
        let conn = self.reader()?;
        let count =
            conn.query_row("SELECT COUNT(*) FROM memory_relationships", [], |row| row.get(0))?;
        Ok(count)
    }

    // ========================================================================
    // CATEGORIES & DOMAINS
    // ========================================================================

    pub fn create_category(
        &self,
        name: &str,
        parent_id: Option<&str>,
        description: Option<&str>,
    ) -> Result<Category> {
        if name.trim().is_empty() {
            return Err(CoreError::validation("category name must not be empty"));
        }
        let category = Category {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            parent_id: parent_id.map(str::to_string),
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };

        let mut conn = self.writer()?;
        let tx = conn.transaction()?;
        if let Some(parent) = &category.parent_id {
            let exists: Option<String> = tx
                .query_row("SELECT id FROM categories WHERE id = ?1", params![parent], |r| {
                    r.get(0)
                })
                .optional()?;
            if exists.is_none() {
                return Err(CoreError::Validation(format!(
                    "parent category not found: {parent}"
                )));
            }
        }
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO categories (id, name, parent_id, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                category.id,
                category.name,
                category.parent_id,
                category.description,
                fmt_ts(category.created_at),
            ],
        )?;
        if inserted == 0 {
            return Err(CoreError::Conflict(format!(
                "category already exists: {}",
                category.name
            )));
        }
        tx.commit()?;
        Ok(category)
    }

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, parent_id, description, created_at FROM categories ORDER BY name",
        )?;
        let rows: Vec<Category> = stmt
            .query_map([], |row| {
                let created: String = row.get(4)?;
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    parent_id: row.get(2)?,
                    description: row.get(3)?,
                    created_at: parse_ts(&created)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    pub fn categorize(
        &self,
        memory_id: &str,
        category_id: &str,
        confidence: f64,
        reasoning: Option<&str>,
    ) -> Result<Categorization> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(CoreError::validation("confidence must be in [0, 1]"));
        }
        let mut conn = self.writer()?;
        let tx = conn.transaction()?;
        let memory_exists: Option<String> = tx
            .query_row("SELECT id FROM memories WHERE id = ?1", params![memory_id], |r| r.get(0))
            .optional()?;
        if memory_exists.is_none() {
            return Err(CoreError::NotFound(format!("memory {memory_id}")));
        }
        let category_exists: Option<String> = tx
            .query_row("SELECT id FROM categories WHERE id = ?1", params![category_id], |r| {
                r.get(0)
            })
            .optional()?;
        if category_exists.is_none() {
            return Err(CoreError::NotFound(format!("category {category_id}")));
        }

        let categorization = Categorization {
            memory_id: memory_id.to_string(),
            category_id: category_id.to_string(),
            confidence,
            reasoning: reasoning.map(str::to_string),
            created_at: Utc::now(),
        };
        tx.execute(
            "INSERT INTO memory_categorizations (memory_id, category_id, confidence, reasoning, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(memory_id, category_id) DO UPDATE SET
                 confidence = excluded.confidence,
                 reasoning = excluded.reasoning",
            params![
                categorization.memory_id,
                categorization.category_id,
                categorization.confidence,
                categorization.reasoning,
                fmt_ts(categorization.created_at),
            ],
        )?;
        tx.commit()?;
        Ok(categorization)
    }

    pub fn upsert_domain(&self, name: &str, description: Option<&str>) -> Result<Domain> {
        if name.trim().is_empty() {
            return Err(CoreError::validation("domain name must not be empty"));
        }
        let domain = Domain {
            name: name.trim().to_string(),
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };
        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO domains (name, description, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET description = COALESCE(excluded.description, description)",
            params![domain.name, domain.description, fmt_ts(domain.created_at)],
        )?;
        Ok(domain)
    }

    pub fn list_domains(&self) -> Result<Vec<Domain>> {
        let conn = self.reader()?;
        let mut stmt =
            conn.prepare("SELECT name, description, created_at FROM domains ORDER BY name")?;
        let rows: Vec<Domain> = stmt
            .query_map([], |row| {
                let created: String = row.get(2)?;
                Ok(Domain {
                    name: row.get(0)?,
                    description: row.get(1)?,
                    created_at: parse_ts(&created)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    // ========================================================================
    // SESSIONS
    // ========================================================================

    /// Insert on first observation, bump `last_accessed` after. The MAX keeps
    /// `last_accessed` non-decreasing even under clock skew.
    pub fn ensure_session(&self, id: &str, agent_type: AgentType) -> Result<Session> {
        if id.trim().is_empty() {
            return Err(CoreError::validation("session id must not be empty"));
        }
        let now = fmt_ts(Utc::now());
        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO agent_sessions (id, agent_type, first_seen, last_accessed, active, metadata)
             VALUES (?1, ?2, ?3, ?3, 1, '{}')
             ON CONFLICT(id) DO UPDATE SET
                 last_accessed = MAX(last_accessed, excluded.last_accessed),
                 active = 1",
            params![id, agent_type.as_str(), now],
        )?;
        drop(conn);
        self.get_session(id)?
            .ok_or_else(|| CoreError::Internal(format!("session {id} vanished after upsert")))
    }

    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let conn = self.reader()?;
        let session = conn
            .query_row(
                "SELECT id, agent_type, first_seen, last_accessed, active, metadata
                 FROM agent_sessions WHERE id = ?1",
                params![id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    pub fn list_sessions(&self, active_only: bool) -> Result<Vec<Session>> {
        let conn = self.reader()?;
        let sql = if active_only {
            "SELECT id, agent_type, first_seen, last_accessed, active, metadata
             FROM agent_sessions WHERE active = 1 ORDER BY last_accessed DESC"
        } else {
            "SELECT id, agent_type, first_seen, last_accessed, active, metadata
             FROM agent_sessions ORDER BY last_accessed DESC"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows: Vec<Session> = stmt
            .query_map([], row_to_session)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    pub fn count_sessions(&self) -> Result<i64> {
        let conn = self.reader()?;
        let count = conn.query_row("SELECT COUNT(*) FROM agent_sessions", [], |row| row.get(0))?;
        Ok(count)
    }

    // ========================================================================
    // DATA SOURCES & BULK INGEST
    // ========================================================================

    pub fn create_data_source(
        &self,
        id: &str,
        source_type: &str,
        config: serde_json::Value,
    ) -> Result<DataSource> {
        if id.trim().is_empty() || source_type.trim().is_empty() {
            return Err(CoreError::validation(
                "data source id and type must not be empty",
            ));
        }
        let source = DataSource {
            id: id.trim().to_string(),
            source_type: source_type.trim().to_string(),
            config,
            status: SourceStatus::Active,
            last_cursor: None,
            created_at: Utc::now(),
        };
        let conn = self.writer()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO data_sources (id, source_type, config, status, last_cursor, created_at)
             VALUES (?1, ?2, ?3, 'active', NULL, ?4)",
            params![
                source.id,
                source.source_type,
                source.config.to_string(),
                fmt_ts(source.created_at),
            ],
        )?;
        if inserted == 0 {
            return Err(CoreError::Conflict(format!(
                "data source already exists: {}",
                source.id
            )));
        }
        Ok(source)
    }

    pub fn get_data_source(&self, id: &str) -> Result<Option<DataSource>> {
        let conn = self.reader()?;
        let source = conn
            .query_row(
                "SELECT id, source_type, config, status, last_cursor, created_at
                 FROM data_sources WHERE id = ?1",
                params![id],
                row_to_source,
            )
            .optional()?;
        Ok(source)
    }

    pub fn list_data_sources(&self) -> Result<Vec<DataSource>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT id, source_type, config, status, last_cursor, created_at
             FROM data_sources ORDER BY created_at DESC",
        )?;
        let rows: Vec<DataSource> = stmt
            .query_map([], row_to_source)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    pub fn update_source_status(&self, id: &str, status: SourceStatus) -> Result<()> {
        let conn = self.writer()?;
        let changed = conn.execute(
            "UPDATE data_sources SET status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )?;
        if changed == 0 {
            return Err(CoreError::NotFound(format!("data source {id}")));
        }
        Ok(())
    }

    pub fn delete_data_source(&self, id: &str) -> Result<()> {
        let mut conn = self.writer()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM data_source_items WHERE source_id = ?1", params![id])?;
        tx.execute(
            "DELETE FROM data_source_sync_history WHERE source_id = ?1",
            params![id],
        )?;
        let changed = tx.execute("DELETE FROM data_sources WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(CoreError::NotFound(format!("data source {id}")));
        }
        tx.commit()?;
        Ok(())
    }

    /// Deduplicated single-item ingest. Returns `None` for a repeat of
    /// `(source_id, external_id)`; the item mapping and the memory row commit
    /// in one transaction.
    pub fn ingest_memory(&self, source_id: &str, item: &IngestItem) -> Result<Option<Memory>> {
        if item.content.trim().is_empty() {
            return Err(CoreError::validation("item content must not be empty"));
        }

        let mut conn = self.writer()?;
        let tx = conn.transaction()?;

        let source_exists: Option<String> = tx
            .query_row("SELECT id FROM data_sources WHERE id = ?1", params![source_id], |r| {
                r.get(0)
            })
            .optional()?;
        if source_exists.is_none() {
            return Err(CoreError::NotFound(format!("data source {source_id}")));
        }

        let already: Option<String> = tx
            .query_row(
                "SELECT external_id FROM data_source_items
                 WHERE source_id = ?1 AND external_id = ?2",
                params![source_id, item.external_id],
                |r| r.get(0),
            )
            .optional()?;
        if already.is_some() {
            return Ok(None);
        }

        let now = Utc::now();
        let mut memory = Memory {
            content: item.content.clone(),
            tags: item.tags.clone(),
            domain: item.domain.clone(),
            source: Some(source_id.to_string()),
            created_at: item.timestamp.unwrap_or(now),
            updated_at: item.timestamp.unwrap_or(now),
            ..Default::default()
        };
        Self::prepare_for_insert(&mut memory);
        Self::validate_memory(&memory)?;
        Self::insert_memory_tx(&tx, &memory)?;

        tx.execute(
            "INSERT INTO data_source_items (source_id, external_id, memory_id, ingested_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![source_id, item.external_id, memory.id, fmt_ts(now)],
        )?;
        tx.execute(
            "UPDATE data_sources SET last_cursor = ?2 WHERE id = ?1",
            params![source_id, item.external_id],
        )?;

        tx.commit()?;
        Ok(Some(memory))
    }

    pub fn record_sync(
        &self,
        source_id: &str,
        processed: usize,
        created: usize,
        duplicates_skipped: usize,
        checkpoint: Option<&str>,
    ) -> Result<()> {
        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO data_source_sync_history
                 (source_id, processed, created, duplicates_skipped, checkpoint, synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                source_id,
                processed as i64,
                created as i64,
                duplicates_skipped as i64,
                checkpoint,
                fmt_ts(Utc::now()),
            ],
        )?;
        Ok(())
    }

    // ========================================================================
    // METRICS & STATS
    // ========================================================================

    pub fn record_metric(&self, operation: &str, duration_ms: u64, success: bool) -> Result<()> {
        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO performance_metrics (operation, duration_ms, success, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![operation, duration_ms as i64, success as i64, fmt_ts(Utc::now())],
        )?;
        Ok(())
    }

    pub fn stats(&self) -> Result<MemoryStats> {
        let conn = self.reader()?;

        let total_memories: i64 =
            conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
        let total_relationships: i64 =
            conn.query_row("SELECT COUNT(*) FROM memory_relationships", [], |r| r.get(0))?;
        let total_sessions: i64 =
            conn.query_row("SELECT COUNT(*) FROM agent_sessions", [], |r| r.get(0))?;
        let total_domains: i64 =
            conn.query_row("SELECT COUNT(*) FROM domains", [], |r| r.get(0))?;
        let total_data_sources: i64 =
            conn.query_row("SELECT COUNT(*) FROM data_sources", [], |r| r.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT domain, COUNT(*) FROM memories
             WHERE domain IS NOT NULL GROUP BY domain ORDER BY COUNT(*) DESC",
        )?;
        let memories_by_domain: Vec<DomainCount> = stmt
            .query_map([], |row| {
                Ok(DomainCount {
                    domain: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        let mut stmt = conn.prepare(
            "SELECT lower(value), COUNT(*) FROM memories, json_each(memories.tags)
             GROUP BY lower(value) ORDER BY COUNT(*) DESC LIMIT 10",
        )?;
        let top_tags: Vec<TagCount> = stmt
            .query_map([], |row| {
                Ok(TagCount {
                    tag: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        Ok(MemoryStats {
            total_memories,
            total_relationships,
            total_sessions,
            total_domains,
            total_data_sources,
            memories_by_domain,
            top_tags,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("test.db")).unwrap();
        (store, dir)
    }

    fn memory(content: &str) -> Memory {
        Memory::new(content)
    }

    #[test]
    fn test_create_and_get_roundtrip() {
        let (store, _dir) = test_store();
        let stored = store.create_memory(memory("Go channels are typed conduits")).unwrap();
        let fetched = store.get_memory(&stored.id).unwrap().unwrap();
        assert_eq!(fetched.content, "Go channels are typed conduits");
        assert_eq!(fetched.importance, 5);
        assert_eq!(fetched.created_at, stored.created_at);
    }

    #[test]
    fn test_create_normalizes_tags() {
        let (store, _dir) = test_store();
        let mut m = memory("tagged");
        m.tags = vec!["Go".to_string(), "go".to_string(), "net".to_string()];
        let stored = store.create_memory(m).unwrap();
        assert_eq!(stored.tags, vec!["Go".to_string(), "net".to_string()]);
    }

    #[test]
    fn test_importance_out_of_range_rejected() {
        let (store, _dir) = test_store();
        let mut m = memory("x");
        m.importance = 11;
        assert!(matches!(
            store.create_memory(m),
            Err(CoreError::Validation(_))
        ));
        let mut m = memory("x");
        m.importance = 0;
        assert!(matches!(
            store.create_memory(m),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_empty_content_rejected() {
        let (store, _dir) = test_store();
        assert!(matches!(
            store.create_memory(memory("   ")),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_update_patches_and_bumps_updated_at() {
        let (store, _dir) = test_store();
        let stored = store.create_memory(memory("before")).unwrap();
        let patch = MemoryPatch {
            content: Some("after".to_string()),
            importance: Some(8),
            ..Default::default()
        };
        let updated = store.update_memory(&stored.id, &patch).unwrap();
        assert_eq!(updated.content, "after");
        assert_eq!(updated.importance, 8);
        assert!(updated.updated_at > stored.updated_at);
        assert_eq!(updated.created_at, stored.created_at);
    }

    #[test]
    fn test_empty_update_strictly_increases_updated_at() {
        let (store, _dir) = test_store();
        let stored = store.create_memory(memory("noop")).unwrap();
        let first = store.update_memory(&stored.id, &MemoryPatch::default()).unwrap();
        let second = store.update_memory(&stored.id, &MemoryPatch::default()).unwrap();
        assert!(first.updated_at > stored.updated_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(second.content, "noop");
    }

    #[test]
    fn test_update_missing_returns_not_found() {
        let (store, _dir) = test_store();
        assert!(matches!(
            store.update_memory("missing", &MemoryPatch::default()),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_is_not_idempotent() {
        let (store, _dir) = test_store();
        let stored = store.create_memory(memory("gone")).unwrap();
        store.delete_memory(&stored.id).unwrap();
        assert!(matches!(
            store.delete_memory(&stored.id),
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_memory(&stored.id),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_cascades_chunks_and_edges() {
        let (store, _dir) = test_store();
        let root = store.create_memory(memory("root content here")).unwrap();
        let mut chunk = memory("chunk content");
        chunk.parent_memory_id = Some(root.id.clone());
        chunk.chunk_level = 1;
        chunk.chunk_index = Some(0);
        let chunk = store.create_memory(chunk).unwrap();

        let other = store.create_memory(memory("other")).unwrap();
        store
            .upsert_relationship(Relationship {
                id: String::new(),
                source_id: root.id.clone(),
                target_id: other.id.clone(),
                relation_type: RelationType::Similar,
                strength: 0.8,
                context: None,
                auto_generated: false,
                created_at: Utc::now(),
            })
            .unwrap();

        store.delete_memory(&root.id).unwrap();
        assert!(store.get_memory(&root.id).unwrap().is_none());
        assert!(store.get_memory(&chunk.id).unwrap().is_none());
        assert!(store.relationships_of(&other.id).unwrap().is_empty());
        // The unrelated memory survives
        assert!(store.get_memory(&other.id).unwrap().is_some());
    }

    #[test]
    fn test_chunk_requires_existing_parent() {
        let (store, _dir) = test_store();
        let mut chunk = memory("orphan");
        chunk.parent_memory_id = Some("no-such-parent".to_string());
        chunk.chunk_level = 1;
        assert!(matches!(
            store.create_memory(chunk),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_fts_finds_all_terms() {
        let (store, _dir) = test_store();
        let stored = store
            .create_memory(memory("Go channels are typed conduits"))
            .unwrap();
        let hits = store
            .search_fts("channels conduits", &MemoryFilters::default(), 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, stored.id);
        // bm25 raw ranks are negative, lower is better
        assert!(hits[0].1 < 0.0);
    }

    #[test]
    fn test_fts_or_semantics_on_multiword() {
        let (store, _dir) = test_store();
        store.create_memory(memory("goroutines schedule work")).unwrap();
        store.create_memory(memory("channels pass messages")).unwrap();
        let hits = store
            .search_fts("goroutines channels", &MemoryFilters::default(), 10)
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_fts_respects_filters() {
        let (store, _dir) = test_store();
        let mut a = memory("rust memory safety");
        a.domain = Some("systems".to_string());
        store.create_memory(a).unwrap();
        let mut b = memory("rust web frameworks");
        b.domain = Some("web".to_string());
        store.create_memory(b).unwrap();

        let filters = MemoryFilters {
            domain: Some("systems".to_string()),
            ..Default::default()
        };
        let hits = store.search_fts("rust", &filters, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.domain.as_deref(), Some("systems"));
    }

    #[test]
    fn test_fts_updates_after_content_change() {
        let (store, _dir) = test_store();
        let stored = store.create_memory(memory("original wording")).unwrap();
        store
            .update_memory(
                &stored.id,
                &MemoryPatch {
                    content: Some("replacement phrasing".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(store
            .search_fts("original", &MemoryFilters::default(), 10)
            .unwrap()
            .is_empty());
        let hits = store
            .search_fts("replacement", &MemoryFilters::default(), 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_list_memories_filters_and_orders() {
        let (store, _dir) = test_store();
        let mut a = memory("first");
        a.session_id = Some("s1".to_string());
        a.created_at = Utc::now() - chrono::Duration::hours(2);
        a.updated_at = a.created_at;
        store.create_memory(a).unwrap();
        let mut b = memory("second");
        b.session_id = Some("s1".to_string());
        store.create_memory(b).unwrap();
        let mut c = memory("other session");
        c.session_id = Some("s2".to_string());
        store.create_memory(c).unwrap();

        let filters = MemoryFilters {
            session_id: Some("s1".to_string()),
            ..Default::default()
        };
        let listed = store.list_memories(&filters).unwrap();
        assert_eq!(listed.len(), 2);
        // Newest first
        assert_eq!(listed[0].content, "second");
    }

    #[test]
    fn test_list_memories_tag_subset() {
        let (store, _dir) = test_store();
        let mut both = memory("both tags");
        both.tags = vec!["x".to_string(), "y".to_string()];
        store.create_memory(both).unwrap();
        let mut one = memory("one tag");
        one.tags = vec!["x".to_string()];
        store.create_memory(one).unwrap();

        let filters = MemoryFilters {
            tags: vec!["x".to_string(), "y".to_string()],
            ..Default::default()
        };
        let listed = store.list_memories(&filters).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].content, "both tags");
    }

    #[test]
    fn test_relationship_upsert_updates_strength() {
        let (store, _dir) = test_store();
        let a = store.create_memory(memory("a")).unwrap();
        let b = store.create_memory(memory("b")).unwrap();
        let edge = |strength: f64| Relationship {
            id: String::new(),
            source_id: a.id.clone(),
            target_id: b.id.clone(),
            relation_type: RelationType::Expands,
            strength,
            context: None,
            auto_generated: false,
            created_at: Utc::now(),
        };
        let first = store.upsert_relationship(edge(0.3)).unwrap();
        let second = store.upsert_relationship(edge(0.9)).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.strength, 0.9);
        assert_eq!(store.count_relationships().unwrap(), 1);
    }

    #[test]
    fn test_relationship_requires_endpoints() {
        let (store, _dir) = test_store();
        let a = store.create_memory(memory("a")).unwrap();
        let rel = Relationship {
            id: String::new(),
            source_id: a.id.clone(),
            target_id: "ghost".to_string(),
            relation_type: RelationType::Causes,
            strength: 0.5,
            context: None,
            auto_generated: false,
            created_at: Utc::now(),
        };
        assert!(matches!(
            store.upsert_relationship(rel),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_ensure_session_monotone() {
        let (store, _dir) = test_store();
        let first = store.ensure_session("dir-abc", AgentType::ClaudeCode).unwrap();
        let second = store.ensure_session("dir-abc", AgentType::ClaudeCode).unwrap();
        assert_eq!(first.first_seen, second.first_seen);
        assert!(second.last_accessed >= first.last_accessed);
        assert_eq!(store.count_sessions().unwrap(), 1);
    }

    #[test]
    fn test_ingest_memory_deduplicates() {
        let (store, _dir) = test_store();
        store
            .create_data_source("src-1", "jsonl", serde_json::json!({}))
            .unwrap();
        let item = IngestItem {
            external_id: "e1".to_string(),
            content: "c".to_string(),
            timestamp: None,
            metadata: None,
            tags: vec![],
            domain: None,
        };
        let first = store.ingest_memory("src-1", &item).unwrap();
        assert!(first.is_some());
        let second = store.ingest_memory("src-1", &item).unwrap();
        assert!(second.is_none());
        assert_eq!(store.count_memories().unwrap(), 1);
    }

    #[test]
    fn test_ingest_memory_unknown_source() {
        let (store, _dir) = test_store();
        let item = IngestItem {
            external_id: "e1".to_string(),
            content: "c".to_string(),
            timestamp: None,
            metadata: None,
            tags: vec![],
            domain: None,
        };
        assert!(matches!(
            store.ingest_memory("nope", &item),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_stats_counts() {
        let (store, _dir) = test_store();
        let mut m = memory("counted");
        m.domain = Some("dev".to_string());
        m.tags = vec!["alpha".to_string()];
        store.create_memory(m).unwrap();
        store.upsert_domain("dev", None).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_memories, 1);
        assert_eq!(stats.total_domains, 1);
        assert_eq!(stats.memories_by_domain.len(), 1);
        assert_eq!(stats.memories_by_domain[0].domain, "dev");
        assert_eq!(stats.top_tags[0].tag, "alpha");
    }

    #[test]
    fn test_fetch_memories_preserves_order_and_skips_missing() {
        let (store, _dir) = test_store();
        let a = store.create_memory(memory("a")).unwrap();
        let b = store.create_memory(memory("b")).unwrap();
        let ids = vec![b.id.clone(), "missing".to_string(), a.id.clone()];
        let fetched = store.fetch_memories(&ids).unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].id, b.id);
        assert_eq!(fetched[1].id, a.id);
    }

    #[test]
    fn test_concurrent_creates_yield_distinct_rows() {
        use std::sync::Arc;
        let (store, _dir) = test_store();
        let store = Arc::new(store);
        let mut handles = vec![];
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store.create_memory(Memory::new(format!("unique content {i}"))).unwrap()
            }));
        }
        let ids: Vec<String> = handles
            .into_iter()
            .map(|h| h.join().unwrap().id)
            .collect();
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 8);
        assert_eq!(store.count_memories().unwrap(), 8);
    }
}
