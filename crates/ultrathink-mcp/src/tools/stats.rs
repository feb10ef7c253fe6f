//! stats tool

use std::sync::Arc;

use serde_json::{json, Value};
use ultrathink_core::{CoreError, Engine};

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {}
    })
}

pub async fn execute(engine: &Arc<Engine>, _args: Option<Value>) -> Result<Value, CoreError> {
    let stats = engine.store().stats()?;
    serde_json::to_value(&stats).map_err(|e| CoreError::internal(e.to_string()))
}
