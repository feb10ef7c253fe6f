//! search tool

use std::sync::Arc;

use serde_json::{json, Value};
use ultrathink_core::{CoreError, Engine, SearchRequest};

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Search query text"
            },
            "search_type": {
                "type": "string",
                "enum": ["lexical", "semantic", "tags", "date_range", "hybrid", "list"],
                "description": "Retrieval strategy (default: lexical when query present, else list)"
            },
            "limit": {
                "type": "integer",
                "description": "Maximum results (default: 10, clamped to [1, 1000])",
                "default": 10,
                "minimum": 1,
                "maximum": 1000
            },
            "min_relevance": {
                "type": "number",
                "description": "Drop results scoring below this (0.0-1.0, default: 0)",
                "default": 0.0,
                "minimum": 0.0,
                "maximum": 1.0
            },
            "session_id": { "type": "string" },
            "domain": { "type": "string" },
            "tags": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Tags for tag search or additional filtering"
            },
            "tag_operator": {
                "type": "string",
                "enum": ["AND", "OR"],
                "description": "Tag combination operator (default: OR)"
            },
            "created_after": { "type": "string", "format": "date-time" },
            "created_before": { "type": "string", "format": "date-time" }
        }
    })
}

pub async fn execute(engine: &Arc<Engine>, args: Option<Value>) -> Result<Value, CoreError> {
    let request: SearchRequest = super::parse_args(args.or(Some(json!({}))))?;
    let response = engine.planner().search(&request).await?;

    let results: Vec<Value> = response
        .results
        .iter()
        .map(|hit| {
            json!({
                "id": hit.memory.id,
                "content": hit.memory.content,
                "score": hit.score,
                "match_type": hit.match_type,
                "importance": hit.memory.importance,
                "tags": hit.memory.tags,
                "domain": hit.memory.domain,
                "session_id": hit.memory.session_id,
                "created_at": hit.memory.created_at,
            })
        })
        .collect();

    Ok(json!({
        "total": response.total,
        "search_type": response.search_type,
        "degraded": response.degraded,
        "results": results,
    }))
}
