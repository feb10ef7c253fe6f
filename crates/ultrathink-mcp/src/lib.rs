//! # Ultrathink MCP Server
//!
//! Transport adapters over the Ultrathink memory engine:
//!
//! - Line-delimited JSON-RPC over stdio (`initialize`, `tools/list`,
//!   `tools/call`, `prompts/*`, `ping`)
//! - REST API under `/api/v1` with the `{success, message, data?}` envelope
//!
//! Both surfaces consume the same [`ultrathink_core::Engine`]; the tools map
//! one-to-one onto the engine's typed contracts.

pub mod http;
pub mod protocol;
pub mod server;
pub mod tools;
