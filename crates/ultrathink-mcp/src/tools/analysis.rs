//! analysis tool

use std::sync::Arc;

use serde_json::{json, Value};
use ultrathink_core::{AnalysisRequest, CoreError, Engine};

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "type": {
                "type": "string",
                "enum": ["question", "summarize", "analyze", "temporal_patterns"],
                "description": "Analysis operation"
            },
            "question": {
                "type": "string",
                "description": "For type=question: the question to answer from memory"
            },
            "timeframe": {
                "type": "string",
                "enum": ["today", "week", "month", "all"],
                "description": "For type=summarize: which period to summarize (default: week)"
            },
            "query": {
                "type": "string",
                "description": "For type=analyze: the focus to mine for recurring themes"
            },
            "concept": {
                "type": "string",
                "description": "For type=temporal_patterns: the concept to trace over time"
            },
            "context_limit": {
                "type": "integer",
                "description": "For type=question: how many memories to ground on (default: 10)",
                "minimum": 1,
                "maximum": 100
            },
            "filters": {
                "type": "object",
                "properties": {
                    "session_id": { "type": "string" },
                    "domain": { "type": "string" },
                    "tags": { "type": "array", "items": { "type": "string" } }
                }
            }
        },
        "required": ["type"]
    })
}

pub async fn execute(engine: &Arc<Engine>, args: Option<Value>) -> Result<Value, CoreError> {
    let request: AnalysisRequest = super::parse_args(args)?;
    let response = engine.analyzer().run(request).await?;
    serde_json::to_value(&response).map_err(|e| CoreError::internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::test_engine;

    #[tokio::test]
    async fn test_question_on_empty_store_is_grounded_refusal() {
        let (engine, _dir) = test_engine();
        let result = execute(
            &engine,
            Some(json!({ "type": "question", "question": "anything" })),
        )
        .await
        .unwrap();

        assert!(result["answer"]
            .as_str()
            .unwrap()
            .contains("No information available"));
        assert!(result["sources"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_type_rejected() {
        let (engine, _dir) = test_engine();
        let err = execute(&engine, Some(json!({ "type": "hallucinate" })))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_arguments_rejected() {
        let (engine, _dir) = test_engine();
        let err = execute(&engine, None).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_schema_enumerates_types() {
        let schema = schema();
        let types = schema["properties"]["type"]["enum"].as_array().unwrap();
        assert_eq!(types.len(), 4);
    }
}
