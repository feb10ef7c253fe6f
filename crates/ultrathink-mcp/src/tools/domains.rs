//! domains tool

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use ultrathink_core::{CoreError, Engine};

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "action": {
                "type": "string",
                "enum": ["create", "list"],
                "description": "Operation to perform"
            },
            "name": { "type": "string", "description": "For create: domain name" },
            "description": { "type": "string" }
        },
        "required": ["action"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum Args {
    Create {
        name: String,
        #[serde(default)]
        description: Option<String>,
    },
    List,
}

pub async fn execute(engine: &Arc<Engine>, args: Option<Value>) -> Result<Value, CoreError> {
    match super::parse_args(args)? {
        Args::Create { name, description } => {
            let domain = engine.store().upsert_domain(&name, description.as_deref())?;
            serde_json::to_value(&domain).map_err(|e| CoreError::internal(e.to_string()))
        }
        Args::List => {
            let domains = engine.store().list_domains()?;
            Ok(json!({ "domains": domains }))
        }
    }
}
