//! JSON-RPC protocol layer
//!
//! Line-delimited JSON-RPC 2.0 over stdio plus the message shapes the
//! server exchanges with clients.

pub mod messages;
pub mod stdio;
pub mod types;
