//! sessions tool

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use ultrathink_core::{AgentType, CoreError, Engine};

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "action": {
                "type": "string",
                "enum": ["list", "get", "register"],
                "description": "Operation to perform (default: list)"
            },
            "id": { "type": "string", "description": "For get/register" },
            "agent_type": {
                "type": "string",
                "enum": ["claude-desktop", "claude-code", "api", "unknown"],
                "description": "For register"
            },
            "active_only": {
                "type": "boolean",
                "description": "For list: only sessions currently marked active",
                "default": false
            }
        }
    })
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum Args {
    List {
        #[serde(default)]
        active_only: bool,
    },
    Get {
        id: String,
    },
    Register {
        id: String,
        #[serde(default)]
        agent_type: AgentType,
    },
}

pub async fn execute(engine: &Arc<Engine>, args: Option<Value>) -> Result<Value, CoreError> {
    let args = match args {
        None => Args::List { active_only: false },
        Some(value) => super::parse_args(Some(value))?,
    };

    match args {
        Args::List { active_only } => {
            let sessions = engine.sessions().list(active_only)?;
            Ok(json!({ "sessions": sessions }))
        }
        Args::Get { id } => {
            let session = engine.sessions().get(&id)?;
            serde_json::to_value(&session).map_err(|e| CoreError::internal(e.to_string()))
        }
        Args::Register { id, agent_type } => {
            let session = engine.sessions().ensure(&id, agent_type)?;
            serde_json::to_value(&session).map_err(|e| CoreError::internal(e.to_string()))
        }
    }
}
