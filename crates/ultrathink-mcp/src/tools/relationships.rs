//! relationships tool
//!
//! Actions: 'create' (typed edge), 'related' (connected memories with the
//! strongest edge), 'graph' (bounded BFS subgraph).

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use ultrathink_core::{CoreError, Engine, RelatedFilter, RelationshipRequest};

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "action": {
                "type": "string",
                "enum": ["create", "related", "graph"],
                "description": "Operation to perform"
            },
            "source_id": { "type": "string", "description": "For create: edge source" },
            "target_id": { "type": "string", "description": "For create: edge target" },
            "type": {
                "type": "string",
                "enum": ["references", "contradicts", "expands", "similar", "sequential", "causes", "enables"],
                "description": "Relationship type"
            },
            "strength": {
                "type": "number",
                "description": "Edge strength (0.0-1.0, default: 0.5)",
                "minimum": 0.0,
                "maximum": 1.0
            },
            "context": { "type": "string" },
            "memory_id": { "type": "string", "description": "For related/graph: the anchor memory" },
            "min_strength": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
            "limit": { "type": "integer", "minimum": 1 },
            "depth": {
                "type": "integer",
                "description": "For graph: traversal depth (clamped to [1, 5], default: 2)",
                "minimum": 1,
                "maximum": 5,
                "default": 2
            }
        },
        "required": ["action"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum Args {
    Create(RelationshipRequest),
    Related {
        memory_id: String,
        #[serde(flatten)]
        filter: RelatedFilter,
    },
    Graph {
        memory_id: String,
        #[serde(default = "default_depth")]
        depth: u32,
    },
}

fn default_depth() -> u32 {
    2
}

pub async fn execute(engine: &Arc<Engine>, args: Option<Value>) -> Result<Value, CoreError> {
    match super::parse_args(args)? {
        Args::Create(request) => {
            let edge = engine.graph().create_relationship(&request)?;
            serde_json::to_value(&edge).map_err(|e| CoreError::internal(e.to_string()))
        }
        Args::Related { memory_id, filter } => {
            let related = engine.graph().find_related(&memory_id, &filter)?;
            let entries: Vec<Value> = related
                .iter()
                .map(|r| {
                    json!({
                        "id": r.memory.id,
                        "content": r.memory.content,
                        "importance": r.memory.importance,
                        "edge": r.edge,
                    })
                })
                .collect();
            Ok(json!({ "memory_id": memory_id, "related": entries }))
        }
        Args::Graph { memory_id, depth } => {
            let view = engine.graph().map_graph(&memory_id, depth)?;
            serde_json::to_value(&view).map_err(|e| CoreError::internal(e.to_string()))
        }
    }
}
