//! categories tool

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
                "enum": ["create", "list", "assign"],
                "description": "Operation to perform"
            },
            "name": { "type": "string", "description": "For create: category name" },
            "parent_id": { "type": "string", "description": "For create: optional parent category" },
            "description": { "type": "string" },
            "memory_id": { "type": "string", "description": "For assign" },
            "category_id": { "type": "string", "description": "For assign" },
            "confidence": {
                "type": "number",
                "description": "For assign: confidence (0.0-1.0, default: 1.0)",
                "minimum": 0.0,
                "maximum": 1.0
            },
            "reasoning": { "type": "string" }
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
        parent_id: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
    List,
    Assign {
        memory_id: String,
        category_id: String,
        #[serde(default = "default_confidence")]
        confidence: f64,
        #[serde(default)]
        reasoning: Option<String>,
    },
}

fn default_confidence() -> f64 {
    1.0
}

pub async fn execute(engine: &Arc<Engine>, args: Option<Value>) -> Result<Value, CoreError> {
    match super::parse_args(args)? {
        Args::Create {
            name,
            parent_id,
            description,
        } => {
            let category = engine.store().create_category(
                &name,
                parent_id.as_deref(),
                description.as_deref(),
            )?;
            serde_json::to_value(&category).map_err(|e| CoreError::internal(e.to_string()))
        }
        Args::List => {
            let categories = engine.store().list_categories()?;
            Ok(json!({ "categories": categories }))
        }
        Args::Assign {
            memory_id,
            category_id,
            confidence,
            reasoning,
        } => {
            let assignment = engine.store().categorize(
                &memory_id,
                &category_id,
                confidence,
                reasoning.as_deref(),
            )?;
            serde_json::to_value(&assignment).map_err(|e| CoreError::internal(e.to_string()))
        }
    }
}
