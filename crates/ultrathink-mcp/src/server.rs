//! JSON-RPC Server Core
//!
//! Routes requests to tool handlers. Rate limiting gates every tools/call;
//! exhaustion surfaces as the dedicated JSON-RPC error rather than a tool
//! result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{debug, warn};
use ultrathink_core::{CoreError, Engine};

use crate::protocol::messages::{
    CallToolRequest, CallToolResult, GetPromptRequest, GetPromptResult, InitializeRequest,
    InitializeResult, ListPromptsResult, ListToolsResult, PromptArgument, PromptContent,
    PromptDescription, PromptMessage, ServerCapabilities, ServerInfo, ToolDescription,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
use crate::tools;

/// JSON-RPC server over the engine
pub struct McpServer {
    engine: Arc<Engine>,
    initialized: bool,
}

impl McpServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            initialized: false,
        }
    }

    /// Handle an incoming request. Returns `None` for notifications.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Handling request: {}", request.method);

        if !self.initialized
            && request.method != "initialize"
            && request.method != "notifications/initialized"
            && request.method != "ping"
        {
            warn!("Rejecting '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::server_not_initialized(),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            "prompts/list" => self.handle_prompts_list(),
            "prompts/get" => self.handle_prompts_get(request.params),
            "ping" => Ok(json!({})),
            method => {
                warn!("Unknown method: {}", method);
                Err(JsonRpcError::method_not_found(method))
            }
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(&mut self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => {
                serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?
            }
            None => InitializeRequest::default(),
        };

        // Use the client's version when it is older; clients reject newer servers
        let negotiated = if request.protocol_version.as_str() < PROTOCOL_VERSION {
            request.protocol_version.clone()
        } else {
            PROTOCOL_VERSION.to_string()
        };

        self.initialized = true;
        debug!("Session initialized with protocol version {negotiated}");

        let result = InitializeResult {
            protocol_version: negotiated,
            server_info: ServerInfo {
                name: "ultrathink".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), json!(false));
                    map
                }),
                prompts: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), json!(false));
                    map
                }),
            },
            instructions: Some(
                "Ultrathink is a persistent memory system. Store important information with \
                 store_memory, retrieve it with search (lexical, semantic, tags, date_range, \
                 hybrid), link related memories with relationships, and ask grounded questions \
                 with analysis."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<Value, JsonRpcError> {
        let tools = vec![
            ToolDescription {
                name: "store_memory".to_string(),
                description: Some(
                    "Store a memory with importance, tags, domain, and session. Long content is \
                     chunked automatically; an embedding is indexed when the vector service is up."
                        .to_string(),
                ),
                input_schema: tools::store_memory::schema(),
            },
            ToolDescription {
                name: "search".to_string(),
                description: Some(
                    "Search memories. Types: lexical (FTS), semantic (vector), tags, date_range, \
                     hybrid (fused lexical + semantic), list. Semantic degrades to lexical when \
                     services are down."
                        .to_string(),
                ),
                input_schema: tools::search::schema(),
            },
            ToolDescription {
                name: "analysis".to_string(),
                description: Some(
                    "AI analysis grounded in retrieved memories. Types: question, summarize, \
                     analyze (recurring themes), temporal_patterns (progression over time)."
                        .to_string(),
                ),
                input_schema: tools::analysis::schema(),
            },
            ToolDescription {
                name: "relationships".to_string(),
                description: Some(
                    "Manage typed edges between memories. Actions: create, related (connected \
                     memories with strongest edge), graph (bounded BFS subgraph)."
                        .to_string(),
                ),
                input_schema: tools::relationships::schema(),
            },
            ToolDescription {
                name: "categories".to_string(),
                description: Some(
                    "Category taxonomy. Actions: create, list, assign (memory to category with \
                     confidence)."
                        .to_string(),
                ),
                input_schema: tools::categories::schema(),
            },
            ToolDescription {
                name: "domains".to_string(),
                description: Some("Domain labels. Actions: create, list.".to_string()),
                input_schema: tools::domains::schema(),
            },
            ToolDescription {
                name: "sessions".to_string(),
                description: Some(
                    "Agent sessions. Actions: list, get, register.".to_string(),
                ),
                input_schema: tools::sessions::schema(),
            },
            ToolDescription {
                name: "stats".to_string(),
                description: Some(
                    "Store statistics: totals, memories by domain, top tags.".to_string(),
                ),
                input_schema: tools::stats::schema(),
            },
            ToolDescription {
                name: "get_memory_by_id".to_string(),
                description: Some("Fetch one memory by id.".to_string()),
                input_schema: tools::memory_admin::get_schema(),
            },
            ToolDescription {
                name: "update_memory".to_string(),
                description: Some(
                    "Patch a memory's content, importance, tags, domain, or source.".to_string(),
                ),
                input_schema: tools::memory_admin::update_schema(),
            },
            ToolDescription {
                name: "delete_memory".to_string(),
                description: Some(
                    "Delete a memory, cascading to its chunks and relationships.".to_string(),
                ),
                input_schema: tools::memory_admin::delete_schema(),
            },
        ];

        serde_json::to_value(ListToolsResult { tools })
            .map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => {
                serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?
            }
            None => return Err(JsonRpcError::invalid_params("Missing tool call parameters")),
        };

        if let Err(CoreError::RateLimited {
            limit_type,
            retry_after_ms,
        }) = self.engine.limiter().check(&request.name)
        {
            return Err(JsonRpcError::rate_limited(&limit_type, retry_after_ms));
        }

        let started = Instant::now();
        let result = match request.name.as_str() {
            "store_memory" => tools::store_memory::execute(&self.engine, request.arguments).await,
            "search" => tools::search::execute(&self.engine, request.arguments).await,
            "analysis" => tools::analysis::execute(&self.engine, request.arguments).await,
            "relationships" => tools::relationships::execute(&self.engine, request.arguments).await,
            "categories" => tools::categories::execute(&self.engine, request.arguments).await,
            "domains" => tools::domains::execute(&self.engine, request.arguments).await,
            "sessions" => tools::sessions::execute(&self.engine, request.arguments).await,
            "stats" => tools::stats::execute(&self.engine, request.arguments).await,
            "get_memory_by_id" => {
                tools::memory_admin::execute_get(&self.engine, request.arguments).await
            }
            "update_memory" => {
                tools::memory_admin::execute_update(&self.engine, request.arguments).await
            }
            "delete_memory" => {
                tools::memory_admin::execute_delete(&self.engine, request.arguments).await
            }
            name => {
                return Err(JsonRpcError::method_not_found(&format!("Unknown tool: {name}")));
            }
        };

        self.engine
            .sessions()
            .record_metric(&request.name, started, result.is_ok());

        let call_result = match result {
            Ok(value) => CallToolResult::text(&value, false),
            Err(err) => CallToolResult::text(&tools::error_payload(&err), true),
        };
        serde_json::to_value(call_result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_prompts_list(&self) -> Result<Value, JsonRpcError> {
        let prompts = vec![
            PromptDescription {
                name: "memory_recap".to_string(),
                description: Some(
                    "Summarize what the memory system knows about a topic".to_string(),
                ),
                arguments: vec![PromptArgument {
                    name: "topic".to_string(),
                    description: Some("Topic to recap".to_string()),
                    required: true,
                }],
            },
            PromptDescription {
                name: "session_startup".to_string(),
                description: Some(
                    "Pull the most relevant memories for the start of a session".to_string(),
                ),
                arguments: vec![],
            },
        ];
        serde_json::to_value(ListPromptsResult { prompts })
            .map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_prompts_get(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let request: GetPromptRequest = match params {
            Some(p) => {
                serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?
            }
            None => return Err(JsonRpcError::invalid_params("Missing prompt name")),
        };

        let result = match request.name.as_str() {
            "memory_recap" => {
                let topic = request
                    .arguments
                    .as_ref()
                    .and_then(|a| a.get("topic"))
                    .and_then(Value::as_str)
                    .unwrap_or("recent work");
                GetPromptResult {
                    description: Some(format!("Recap of stored knowledge about {topic}")),
                    messages: vec![PromptMessage {
                        role: "user".to_string(),
                        content: PromptContent {
                            content_type: "text".to_string(),
                            text: format!(
                                "Use the search tool to find memories about \"{topic}\", then \
                                 summarize what is known, citing memory ids."
                            ),
                        },
                    }],
                }
            }
            "session_startup" => GetPromptResult {
                description: Some("Session startup context".to_string()),
                messages: vec![PromptMessage {
                    role: "user".to_string(),
                    content: PromptContent {
                        content_type: "text".to_string(),
                        text: "Call search with search_type=list to load the most recent \
                               memories for this session, then call stats for an overview."
                            .to_string(),
                    },
                }],
            },
            name => {
                return Err(JsonRpcError::invalid_params(&format!(
                    "Unknown prompt: {name}"
                )));
            }
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
