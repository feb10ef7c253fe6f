//! Relationship graph
//!
//! Edges are stored in the relationship table and never own memories;
//! traversal is BFS with a visited set, bounded by the clamped depth.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::memory::{Memory, RelationType, Relationship};
use crate::storage::Store;

/// Depth clamp bounds for traversal
const DEPTH_MIN: u32 = 1;
const DEPTH_MAX: u32 = 5;

const PREVIEW_CHARS: usize = 120;

/// Request to create (or reinforce) an edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipRequest {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    #[serde(default = "default_strength")]
    pub strength: f64,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub auto_generated: bool,
}

fn default_strength() -> f64 {
    0.5
}

/// Filters for related-memory discovery
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelatedFilter {
    #[serde(rename = "type")]
    pub relation_type: Option<String>,
    pub min_strength: Option<f64>,
    pub limit: Option<usize>,
}

/// A related memory annotated with the strongest matching edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedMemory {
    pub memory: Memory,
    pub edge: Relationship,
}

/// A traversal node with its BFS distance from the root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub content_preview: String,
    pub importance: i32,
    pub distance: u32,
}

/// A deduplicated traversal edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    pub strength: f64,
}

/// Bounded subgraph around a root memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphView {
    pub root: String,
    pub depth: u32,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_CHARS {
        content.to_string()
    } else {
        let cut: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    }
}

pub struct Graph {
    store: Arc<Store>,
}

impl Graph {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Create a typed edge. Both endpoints must exist, self-loops are
    /// rejected, and a duplicate (source, target, type) updates strength and
    /// context in place.
    pub fn create_relationship(&self, request: &RelationshipRequest) -> Result<Relationship> {
        let relation_type = RelationType::parse_name(&request.relation_type).ok_or_else(|| {
            CoreError::Validation(format!(
                "unknown relationship type: {}",
                request.relation_type
            ))
        })?;
        if !(0.0..=1.0).contains(&request.strength) {
            return Err(CoreError::validation("strength must be in [0, 1]"));
        }
        if request.source_id == request.target_id {
            return Err(CoreError::validation("self-loops are not allowed"));
        }

        self.store.upsert_relationship(Relationship {
            id: Uuid::new_v4().to_string(),
            source_id: request.source_id.clone(),
            target_id: request.target_id.clone(),
            relation_type,
            strength: request.strength,
            context: request.context.clone(),
            auto_generated: request.auto_generated,
            created_at: Utc::now(),
        })
    }

    /// Distinct memories connected to `id` by at least one matching edge,
    /// each annotated with the strongest such edge. Ordered by edge strength
    /// descending, then memory importance descending.
    pub fn find_related(&self, id: &str, filter: &RelatedFilter) -> Result<Vec<RelatedMemory>> {
        self.store.require_memory(id)?;

        let type_filter = match &filter.relation_type {
            Some(name) => Some(RelationType::parse_name(name).ok_or_else(|| {
                CoreError::Validation(format!("unknown relationship type: {name}"))
            })?),
            None => None,
        };
        let min_strength = filter.min_strength.unwrap_or(0.0);

        let mut strongest: HashMap<String, Relationship> = HashMap::new();
        for edge in self.store.relationships_of(id)? {
            if edge.strength < min_strength {
                continue;
            }
            if let Some(wanted) = type_filter {
                if edge.relation_type != wanted {
                    continue;
                }
            }
            let other = edge.other_end(id).to_string();
            match strongest.get(&other) {
                Some(existing) if existing.strength >= edge.strength => {}
                _ => {
                    strongest.insert(other, edge);
                }
            }
        }

        let mut related: Vec<RelatedMemory> = strongest
            .into_iter()
            .filter_map(|(other_id, edge)| {
                self.store
                    .get_memory(&other_id)
                    .ok()
                    .flatten()
                    .map(|memory| RelatedMemory { memory, edge })
            })
            .collect();

        related.sort_by(|a, b| {
            b.edge
                .strength
                .total_cmp(&a.edge.strength)
                .then_with(|| b.memory.importance.cmp(&a.memory.importance))
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        if let Some(limit) = filter.limit {
            related.truncate(limit);
        }
        Ok(related)
    }

    /// Breadth-first traversal from `root`, visiting each memory at most
    /// once. Nodes already at the depth bound are not expanded; edges are
    /// deduplicated as unordered pairs.
    pub fn map_graph(&self, root: &str, depth: u32) -> Result<GraphView> {
        let depth = depth.clamp(DEPTH_MIN, DEPTH_MAX);
        let root_memory = self.store.require_memory(root)?;

        let mut nodes = vec![GraphNode {
            id: root_memory.id.clone(),
            content_preview: preview(&root_memory.content),
            importance: root_memory.importance,
            distance: 0,
        }];
        let mut edges: Vec<GraphEdge> = Vec::new();
        let mut seen_edges: HashSet<(String, String)> = HashSet::new();
        let mut visited: HashSet<String> = HashSet::from([root_memory.id.clone()]);
        let mut queue: VecDeque<(String, u32)> = VecDeque::from([(root_memory.id, 0)]);

        while let Some((current, distance)) = queue.pop_front() {
            if distance >= depth {
                continue;
            }
            for edge in self.store.relationships_of(&current)? {
                let pair = if edge.source_id < edge.target_id {
                    (edge.source_id.clone(), edge.target_id.clone())
                } else {
                    (edge.target_id.clone(), edge.source_id.clone())
                };
                if seen_edges.insert(pair) {
                    edges.push(GraphEdge {
                        source_id: edge.source_id.clone(),
                        target_id: edge.target_id.clone(),
                        relation_type: edge.relation_type,
                        strength: edge.strength,
                    });
                }

                let other = edge.other_end(&current).to_string();
                if visited.insert(other.clone()) {
                    if let Some(memory) = self.store.get_memory(&other)? {
                        nodes.push(GraphNode {
                            id: memory.id.clone(),
                            content_preview: preview(&memory.content),
                            importance: memory.importance,
                            distance: distance + 1,
                        });
                        queue.push_back((other, distance + 1));
                    }
                }
            }
        }

        // Every edge must connect two returned nodes
        let node_ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        edges.retain(|e| node_ids.contains(e.source_id.as_str()) && node_ids.contains(e.target_id.as_str()));

        Ok(GraphView {
            root: nodes[0].id.clone(),
            depth,
            nodes,
            edges,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
