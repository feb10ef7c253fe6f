//! Tool implementations
//!
//! One module per tool. Each exposes `schema()` returning the JSON input
//! schema and `execute()` taking the engine plus raw arguments.

pub mod analysis;
pub mod categories;
pub mod domains;
pub mod memory_admin;
pub mod relationships;
pub mod search;
pub mod sessions;
pub mod stats;
pub mod store_memory;

use serde_json::{json, Value};
use ultrathink_core::CoreError;

/// Map an engine error to the structured payload embedded in `isError`
/// tool results.
pub fn error_payload(err: &CoreError) -> Value {
    let kind = match err {
        CoreError::Validation(_) => "validation",
        CoreError::NotFound(_) => "not_found",
        CoreError::Conflict(_) => "conflict",
        CoreError::ServiceUnavailable(_) => "service_unavailable",
        CoreError::RateLimited { .. } => "rate_limited",
        CoreError::PayloadTooLarge { .. } => "payload_too_large",
        _ => "internal",
    };
    json!({ "error": { "kind": kind, "message": err.to_string() } })
}

/// Parse tool arguments into a typed struct, mapping failures to
/// `Validation` so they surface as invalid input rather than internal
/// errors.
pub fn parse_args<T: serde::de::DeserializeOwned>(args: Option<Value>) -> Result<T, CoreError> {
    let value = args.ok_or_else(|| CoreError::validation("missing arguments"))?;
    serde_json::from_value(value).map_err(|e| CoreError::Validation(format!("invalid arguments: {e}")))
}
