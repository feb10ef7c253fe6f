//! Sessions and data sources

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of agent behind a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentType {
    ClaudeDesktop,
    ClaudeCode,
    Api,
    #[default]
    Unknown,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::ClaudeDesktop => "claude-desktop",
            AgentType::ClaudeCode => "claude-code",
            AgentType::Api => "api",
            AgentType::Unknown => "unknown",
        }
    }

    /// Parse from string name; unknown names map to `Unknown`
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "claude-desktop" => AgentType::ClaudeDesktop,
            "claude-code" => AgentType::ClaudeCode,
            "api" => AgentType::Api,
            _ => AgentType::Unknown,
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An agent correlation context, auto-created on first memory write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub agent_type: AgentType,
    pub first_seen: DateTime<Utc>,
    /// Non-decreasing; bumped on every access
    pub last_accessed: DateTime<Utc>,
    pub active: bool,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Lifecycle status of a registered data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    #[default]
    Active,
    Paused,
    Error,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Active => "active",
            SourceStatus::Paused => "paused",
            SourceStatus::Error => "error",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(SourceStatus::Active),
            "paused" => Some(SourceStatus::Paused),
            "error" => Some(SourceStatus::Error),
            _ => None,
        }
    }
}

/// A registered external feed for bulk ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    pub id: String,
    pub source_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
    pub status: SourceStatus,
    /// External id of the last item processed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cursor: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A transient item handed to bulk ingestion.
///
/// Items are deduplicated on `(source_id, external_id)`; a repeat is reported
/// but never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestItem {
    pub external_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Aggregate outcome of one bulk-ingest call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub processed: usize,
    pub created: usize,
    pub duplicates_skipped: usize,
    /// External id of the last processed item unless overridden by the caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
}
