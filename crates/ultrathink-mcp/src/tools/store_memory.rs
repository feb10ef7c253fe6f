//! store_memory tool

use std::sync::Arc;

use serde_json::{json, Value};
use ultrathink_core::{CoreError, Engine, StoreMemoryRequest};

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "content": {
                "type": "string",
                "description": "The memory content to store"
            },
            "importance": {
                "type": "integer",
                "description": "Importance from 1 to 10 (default: 5)",
                "minimum": 1,
                "maximum": 10,
                "default": 5
            },
            "tags": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Tags for categorization"
            },
            "domain": {
                "type": "string",
                "description": "Free-form domain label"
            },
            "session_id": {
                "type": "string",
                "description": "Owning session; derived from the working directory when omitted"
            },
            "source": {
                "type": "string",
                "description": "Provenance (URL, file, conversation)"
            },
            "agent_type": {
                "type": "string",
                "enum": ["claude-desktop", "claude-code", "api", "unknown"],
                "description": "Kind of agent storing the memory"
            }
        },
        "required": ["content"]
    })
}

pub async fn execute(engine: &Arc<Engine>, args: Option<Value>) -> Result<Value, CoreError> {
    let request: StoreMemoryRequest = super::parse_args(args)?;
    let stored = engine.ingestor().store(request).await?;

    Ok(json!({
        "id": stored.memory.id,
        "session_id": stored.memory.session_id,
        "chunks": stored.chunks,
        "embedding_degraded": stored.embedding_degraded,
        "created_at": stored.memory.created_at,
    }))
}
