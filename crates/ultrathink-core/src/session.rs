//! Session tracking
//!
//! Sessions correlate a sequence of memory operations with one agent. They
//! are auto-created on first write and never auto-deleted. The
//! `git-directory` strategy derives a stable id from the workspace root so
//! every process launched in the same project shares a session.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::{CoreError, Result};
use crate::memory::{AgentType, Session};
use crate::storage::Store;

/// Identifier derivation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStrategy {
    /// Hash the workspace root directory
    GitDirectory,
    /// Require a caller-supplied id
    Manual,
}

impl SessionStrategy {
    pub fn parse_name(s: &str) -> Self {
        match s {
            "manual" => SessionStrategy::Manual,
            _ => SessionStrategy::GitDirectory,
        }
    }
}

/// Derive a stable session id from a directory path.
pub fn derive_session_id(dir: &Path) -> String {
    let canonical = dir
        .canonicalize()
        .unwrap_or_else(|_| dir.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("dir-{}", &hex[..16])
}

pub struct SessionTracker {
    store: Arc<Store>,
    strategy: SessionStrategy,
    auto_generate: bool,
}

impl SessionTracker {
    pub fn new(store: Arc<Store>, config: &SessionConfig) -> Self {
        Self {
            store,
            strategy: SessionStrategy::parse_name(&config.strategy),
            auto_generate: config.auto_generate,
        }
    }

    /// Resolve the session id for an operation. An explicit id always wins;
    /// otherwise the configured strategy decides, and `None` means the
    /// operation proceeds sessionless.
    pub fn resolve(&self, explicit: Option<&str>) -> Option<String> {
        if let Some(id) = explicit {
            let trimmed = id.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if !self.auto_generate {
            return None;
        }
        match self.strategy {
            SessionStrategy::GitDirectory => std::env::current_dir()
                .ok()
                .map(|dir| derive_session_id(&dir)),
            SessionStrategy::Manual => None,
        }
    }

    /// Insert on first observation, bump `last_accessed` after.
    pub fn ensure(&self, id: &str, agent_type: AgentType) -> Result<Session> {
        self.store.ensure_session(id, agent_type)
    }

    pub fn get(&self, id: &str) -> Result<Session> {
        self.store
            .get_session(id)?
            .ok_or_else(|| CoreError::NotFound(format!("session {id}")))
    }

    pub fn list(&self, active_only: bool) -> Result<Vec<Session>> {
        self.store.list_sessions(active_only)
    }

    /// Record an operation metric; failures are logged, never surfaced.
    pub fn record_metric(&self, operation: &str, started: Instant, success: bool) {
        let duration_ms = started.elapsed().as_millis() as u64;
        if let Err(err) = self.store.record_metric(operation, duration_ms, success) {
            debug!("failed to record metric for {operation}: {err}");
        }
    }
}
