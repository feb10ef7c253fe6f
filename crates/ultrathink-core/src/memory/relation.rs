//! Relationships, categories, and domains

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed set of relationship types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationType {
    References,
    Contradicts,
    Expands,
    Similar,
    Sequential,
    Causes,
    Enables,
}

impl RelationType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::References => "references",
            RelationType::Contradicts => "contradicts",
            RelationType::Expands => "expands",
            RelationType::Similar => "similar",
            RelationType::Sequential => "sequential",
            RelationType::Causes => "causes",
            RelationType::Enables => "enables",
        }
    }

    /// Parse from string name; unknown names are rejected at the boundary
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "references" => Some(RelationType::References),
            "contradicts" => Some(RelationType::Contradicts),
            "expands" => Some(RelationType::Expands),
            "similar" => Some(RelationType::Similar),
            "sequential" => Some(RelationType::Sequential),
            "causes" => Some(RelationType::Causes),
            "enables" => Some(RelationType::Enables),
            _ => None,
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed, typed edge between two distinct memories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    /// Edge strength in [0,1]
    pub strength: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub auto_generated: bool,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// Whether this edge touches the given memory on either end
    pub fn touches(&self, memory_id: &str) -> bool {
        self.source_id == memory_id || self.target_id == memory_id
    }

    /// The endpoint opposite to the given memory
    pub fn other_end(&self, memory_id: &str) -> &str {
        if self.source_id == memory_id {
            &self.target_id
        } else {
            &self.source_id
        }
    }
}

/// A category label. Categories form a forest via `parent_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Assignment of a memory to a category with a confidence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Categorization {
    pub memory_id: String,
    pub category_id: String,
    /// Confidence in [0,1]
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A domain label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_type_roundtrip() {
        for rt in [
            RelationType::References,
            RelationType::Contradicts,
            RelationType::Expands,
            RelationType::Similar,
            RelationType::Sequential,
            RelationType::Causes,
            RelationType::Enables,
        ] {
            assert_eq!(RelationType::parse_name(rt.as_str()), Some(rt));
        }
    }

    #[test]
    fn test_relation_type_rejects_unknown() {
        assert_eq!(RelationType::parse_name("friend_of"), None);
    }

    #[test]
    fn test_other_end() {
        let edge = Relationship {
            id: "e1".to_string(),
            source_id: "a".to_string(),
            target_id: "b".to_string(),
            relation_type: RelationType::Similar,
            strength: 0.5,
            context: None,
            auto_generated: false,
            created_at: Utc::now(),
        };
        assert_eq!(edge.other_end("a"), "b");
        assert_eq!(edge.other_end("b"), "a");
        assert!(edge.touches("a"));
        assert!(!edge.touches("c"));
    }
}
