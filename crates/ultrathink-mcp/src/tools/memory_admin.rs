//! Memory administration tools: get_memory_by_id, update_memory,
//! delete_memory

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use ultrathink_core::{CoreError, Engine, MemoryPatch};

pub fn get_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "description": "Memory id" }
        },
        "required": ["id"]
    })
}

pub fn update_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "description": "Memory id" },
            "content": { "type": "string" },
            "importance": { "type": "integer", "minimum": 1, "maximum": 10 },
            "tags": { "type": "array", "items": { "type": "string" } },
            "domain": { "type": "string" },
            "source": { "type": "string" }
        },
        "required": ["id"]
    })
}

pub fn delete_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "description": "Memory id" }
        },
        "required": ["id"]
    })
}

#[derive(Debug, Deserialize)]
struct IdArgs {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    id: String,
    #[serde(flatten)]
    patch: MemoryPatch,
}

pub async fn execute_get(engine: &Arc<Engine>, args: Option<Value>) -> Result<Value, CoreError> {
    let args: IdArgs = super::parse_args(args)?;
    let memory = engine.store().require_memory(&args.id)?;
    serde_json::to_value(&memory).map_err(|e| CoreError::internal(e.to_string()))
}

pub async fn execute_update(engine: &Arc<Engine>, args: Option<Value>) -> Result<Value, CoreError> {
    let args: UpdateArgs = super::parse_args(args)?;
    let memory = engine.store().update_memory(&args.id, &args.patch)?;
    serde_json::to_value(&memory).map_err(|e| CoreError::internal(e.to_string()))
}

pub async fn execute_delete(engine: &Arc<Engine>, args: Option<Value>) -> Result<Value, CoreError> {
    let args: IdArgs = super::parse_args(args)?;
    engine.ingestor().delete(&args.id).await?;
    Ok(json!({ "deleted": args.id }))
}
