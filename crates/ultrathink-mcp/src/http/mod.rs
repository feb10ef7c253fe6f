//! HTTP service
//!
//! REST API under `/api/v1` mirroring the tool surface plus data-source
//! CRUD and chat-transcript ingestion. Responses use the
//! `{success, message, data?}` envelope; bearer or X-API-Key auth applies to
//! everything except the health endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use ultrathink_core::{
    AnalysisRequest, CoreError, Engine, IngestItem, MemoryFilters, MemoryPatch, RelatedFilter,
    RelationshipRequest, SearchRequest, SourceStatus, StoreMemoryRequest,
};

/// Default body limit (1 MiB); ingest endpoints allow 10 MiB
const BODY_LIMIT: usize = 1024 * 1024;
const INGEST_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// How many upward probes `auto_port` tries before giving up
const AUTO_PORT_ATTEMPTS: u16 = 20;

#[derive(Clone)]
pub struct HttpState {
    engine: Arc<Engine>,
    api_key: Option<String>,
}

/// HTTP server configuration
pub struct HttpServer {
    pub host: String,
    pub port: u16,
    pub auto_port: bool,
    pub cors: bool,
    pub api_key: Option<String>,
    pub allow_origins: Vec<String>,
}

impl HttpServer {
    pub fn router(
        engine: Arc<Engine>,
        api_key: Option<String>,
        cors: bool,
        allow_origins: &[String],
    ) -> Router {
        let state = HttpState { engine, api_key };

        let ingest_routes = Router::new()
            .route("/sources/{id}/ingest", post(ingest_source))
            .route("/ingest/chat", post(ingest_chat))
            .layer(DefaultBodyLimit::max(INGEST_BODY_LIMIT));

        let api = Router::new()
            .route("/health", get(health))
            .route("/memories", post(create_memory).get(list_memories))
            .route(
                "/memories/{id}",
                get(get_memory).put(update_memory).delete(delete_memory),
            )
            .route("/memories/{id}/related", get(related_memories))
            .route("/memories/{id}/graph", get(memory_graph))
            .route("/search", post(search))
            .route("/analysis", post(analysis))
            .route("/relationships", post(create_relationship))
            .route("/categories", get(list_categories).post(create_category))
            .route("/categories/assign", post(assign_category))
            .route("/domains", get(list_domains).post(create_domain))
            .route("/sessions", get(list_sessions))
            .route("/sessions/{id}", get(get_session))
            .route("/stats", get(stats))
            .route("/sources", get(list_sources).post(create_source))
            .route("/sources/{id}", get(get_source).delete(delete_source))
            .route("/sources/{id}/status", put(update_source_status))
            .merge(ingest_routes)
            .layer(DefaultBodyLimit::max(BODY_LIMIT))
            .layer(middleware::from_fn_with_state(state.clone(), auth))
            .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
            .with_state(state);

        let mut app = Router::new().nest("/api/v1", api);
        if cors {
            let origins: Vec<_> = allow_origins
                .iter()
                .filter_map(|origin| origin.parse::<axum::http::HeaderValue>().ok())
                .collect();
            let layer = if origins.is_empty() {
                CorsLayer::new().allow_origin(Any)
            } else {
                CorsLayer::new().allow_origin(tower_http::cors::AllowOrigin::list(origins))
            };
            app = app.layer(layer.allow_methods(Any).allow_headers(Any));
        }
        app
    }

    /// Bind and serve, probing upward from the configured port when
    /// `auto_port` is set.
    pub async fn run(self, engine: Arc<Engine>) -> std::io::Result<()> {
        let app = Self::router(engine, self.api_key, self.cors, &self.allow_origins);

        let attempts = if self.auto_port { AUTO_PORT_ATTEMPTS } else { 1 };
        let mut bound = None;
        for offset in 0..attempts {
            let port = self.port.saturating_add(offset);
            let addr: SocketAddr = format!("{}:{}", self.host, port)
                .parse()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
            match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    info!("HTTP API listening on http://{}", addr);
                    bound = Some(listener);
                    break;
                }
                Err(e) if offset + 1 < attempts => {
                    warn!("Port {port} unavailable ({e}), trying {}", port + 1);
                }
                Err(e) => return Err(e),
            }
        }
        let Some(listener) = bound else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                "no free port found",
            ));
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            signal.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

// ============================================================================
// ENVELOPE & ERROR MAPPING
// ============================================================================

fn ok(data: Value) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "success": true, "message": "ok", "data": data })),
    )
        .into_response()
}

fn fail(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "success": false, "message": message })),
    )
        .into_response()
}

fn error_response(err: CoreError) -> Response {
    let status = match &err {
        CoreError::Validation(_) => StatusCode::BAD_REQUEST,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::Conflict(_) => StatusCode::CONFLICT,
        CoreError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        CoreError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        CoreError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    fail(status, &err.to_string())
}

fn respond(result: Result<Value, CoreError>) -> Response {
    match result {
        Ok(data) => ok(data),
        Err(err) => error_response(err),
    }
}

// ============================================================================
// MIDDLEWARE
// ============================================================================

fn header_key(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

async fn auth(
    State(state): State<HttpState>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let Some(expected) = &state.api_key else {
        return next.run(request).await;
    };
    // Health stays reachable for probes
    if request.uri().path().ends_with("/health") {
        return next.run(request).await;
    }

    match header_key(request.headers()) {
        Some(provided) if &provided == expected => next.run(request).await,
        _ => fail(StatusCode::UNAUTHORIZED, "invalid or missing API key"),
    }
}

async fn rate_limit(
    State(state): State<HttpState>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    if request.uri().path().ends_with("/health") {
        return next.run(request).await;
    }
    match state.engine.limiter().check("http") {
        Ok(()) => next.run(request).await,
        Err(CoreError::RateLimited {
            limit_type,
            retry_after_ms,
        }) => {
            let mut response = fail(
                StatusCode::TOO_MANY_REQUESTS,
                &format!("rate limited ({limit_type})"),
            );
            let retry_secs = retry_after_ms.div_ceil(1000).max(1);
            if let Ok(value) = retry_secs.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
        Err(err) => error_response(err),
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn health() -> Response {
    ok(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "time": chrono::Utc::now(),
    }))
}

async fn create_memory(
    State(state): State<HttpState>,
    Json(request): Json<StoreMemoryRequest>,
) -> Response {
    let result = state.engine.ingestor().store(request).await;
    respond(result.and_then(|stored| {
        serde_json::to_value(&stored).map_err(|e| CoreError::internal(e.to_string()))
    }))
}

/// Listing query; tags arrive comma-separated
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListQuery {
    session_id: Option<String>,
    domain: Option<String>,
    tags: Option<String>,
    min_importance: Option<i32>,
    max_importance: Option<i32>,
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_memories(
    State(state): State<HttpState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let filters = MemoryFilters {
        session_id: query.session_id,
        domain: query.domain,
        tags: query
            .tags
            .map(|t| {
                t.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        min_importance: query.min_importance,
        max_importance: query.max_importance,
        limit: Some(query.limit.unwrap_or(50).min(1000)),
        offset: query.offset,
        ..Default::default()
    };
    respond(
        state
            .engine
            .store()
            .list_memories(&filters)
            .map(|memories| json!({ "memories": memories })),
    )
}

async fn get_memory(State(state): State<HttpState>, Path(id): Path<String>) -> Response {
    respond(state.engine.store().require_memory(&id).and_then(|memory| {
        serde_json::to_value(&memory).map_err(|e| CoreError::internal(e.to_string()))
    }))
}

async fn update_memory(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Json(patch): Json<MemoryPatch>,
) -> Response {
    respond(
        state
            .engine
            .store()
            .update_memory(&id, &patch)
            .and_then(|memory| {
                serde_json::to_value(&memory).map_err(|e| CoreError::internal(e.to_string()))
            }),
    )
}

async fn delete_memory(State(state): State<HttpState>, Path(id): Path<String>) -> Response {
    respond(
        state
            .engine
            .ingestor()
            .delete(&id)
            .await
            .map(|()| json!({ "deleted": id })),
    )
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GraphQuery {
    depth: u32,
}

impl Default for GraphQuery {
    fn default() -> Self {
        Self { depth: 2 }
    }
}

async fn related_memories(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Query(filter): Query<RelatedFilter>,
) -> Response {
    respond(
        state
            .engine
            .graph()
            .find_related(&id, &filter)
            .and_then(|related| {
                serde_json::to_value(&related)
                    .map(|value| json!({ "related": value }))
                    .map_err(|e| CoreError::internal(e.to_string()))
            }),
    )
}

async fn memory_graph(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Query(query): Query<GraphQuery>,
) -> Response {
    respond(
        state
            .engine
            .graph()
            .map_graph(&id, query.depth)
            .and_then(|view| {
                serde_json::to_value(&view).map_err(|e| CoreError::internal(e.to_string()))
            }),
    )
}

async fn search(State(state): State<HttpState>, Json(request): Json<SearchRequest>) -> Response {
    let result = state.engine.planner().search(&request).await;
    respond(result.and_then(|response| {
        serde_json::to_value(&response).map_err(|e| CoreError::internal(e.to_string()))
    }))
}

async fn analysis(
    State(state): State<HttpState>,
    Json(request): Json<AnalysisRequest>,
) -> Response {
    let result = state.engine.analyzer().run(request).await;
    respond(result.and_then(|response| {
        serde_json::to_value(&response).map_err(|e| CoreError::internal(e.to_string()))
    }))
}

async fn create_relationship(
    State(state): State<HttpState>,
    Json(request): Json<RelationshipRequest>,
) -> Response {
    respond(
        state
            .engine
            .graph()
            .create_relationship(&request)
            .and_then(|edge| {
                serde_json::to_value(&edge).map_err(|e| CoreError::internal(e.to_string()))
            }),
    )
}

#[derive(Debug, Deserialize)]
struct CreateCategoryBody {
    name: String,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

async fn create_category(
    State(state): State<HttpState>,
    Json(body): Json<CreateCategoryBody>,
) -> Response {
    respond(
        state
            .engine
            .store()
            .create_category(&body.name, body.parent_id.as_deref(), body.description.as_deref())
            .and_then(|category| {
                serde_json::to_value(&category).map_err(|e| CoreError::internal(e.to_string()))
            }),
    )
}

async fn list_categories(State(state): State<HttpState>) -> Response {
    respond(
        state
            .engine
            .store()
            .list_categories()
            .map(|categories| json!({ "categories": categories })),
    )
}

#[derive(Debug, Deserialize)]
struct AssignCategoryBody {
    memory_id: String,
    category_id: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    reasoning: Option<String>,
}

fn default_confidence() -> f64 {
    1.0
}

async fn assign_category(
    State(state): State<HttpState>,
    Json(body): Json<AssignCategoryBody>,
) -> Response {
    respond(
        state
            .engine
            .store()
            .categorize(
                &body.memory_id,
                &body.category_id,
                body.confidence,
                body.reasoning.as_deref(),
            )
            .and_then(|assignment| {
                serde_json::to_value(&assignment).map_err(|e| CoreError::internal(e.to_string()))
            }),
    )
}

#[derive(Debug, Deserialize)]
struct CreateDomainBody {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

async fn create_domain(
    State(state): State<HttpState>,
    Json(body): Json<CreateDomainBody>,
) -> Response {
    respond(
        state
            .engine
            .store()
            .upsert_domain(&body.name, body.description.as_deref())
            .and_then(|domain| {
                serde_json::to_value(&domain).map_err(|e| CoreError::internal(e.to_string()))
            }),
    )
}

async fn list_domains(State(state): State<HttpState>) -> Response {
    respond(
        state
            .engine
            .store()
            .list_domains()
            .map(|domains| json!({ "domains": domains })),
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SessionQuery {
    active_only: bool,
}

async fn list_sessions(
    State(state): State<HttpState>,
    Query(query): Query<SessionQuery>,
) -> Response {
    respond(
        state
            .engine
            .sessions()
            .list(query.active_only)
            .map(|sessions| json!({ "sessions": sessions })),
    )
}

async fn get_session(State(state): State<HttpState>, Path(id): Path<String>) -> Response {
    respond(state.engine.sessions().get(&id).and_then(|session| {
        serde_json::to_value(&session).map_err(|e| CoreError::internal(e.to_string()))
    }))
}

async fn stats(State(state): State<HttpState>) -> Response {
    respond(state.engine.store().stats().and_then(|stats| {
        serde_json::to_value(&stats).map_err(|e| CoreError::internal(e.to_string()))
    }))
}

#[derive(Debug, Deserialize)]
struct CreateSourceBody {
    id: String,
    #[serde(rename = "type")]
    source_type: String,
    #[serde(default)]
    config: Value,
}

async fn create_source(
    State(state): State<HttpState>,
    Json(body): Json<CreateSourceBody>,
) -> Response {
    respond(
        state
            .engine
            .store()
            .create_data_source(&body.id, &body.source_type, body.config)
            .and_then(|source| {
                serde_json::to_value(&source).map_err(|e| CoreError::internal(e.to_string()))
            }),
    )
}

async fn list_sources(State(state): State<HttpState>) -> Response {
    respond(
        state
            .engine
            .store()
            .list_data_sources()
            .map(|sources| json!({ "sources": sources })),
    )
}

async fn get_source(State(state): State<HttpState>, Path(id): Path<String>) -> Response {
    let result = state.engine.store().get_data_source(&id).and_then(|source| {
        source
            .ok_or_else(|| CoreError::NotFound(format!("data source {id}")))
            .and_then(|s| serde_json::to_value(&s).map_err(|e| CoreError::internal(e.to_string())))
    });
    respond(result)
}

async fn delete_source(State(state): State<HttpState>, Path(id): Path<String>) -> Response {
    respond(
        state
            .engine
            .store()
            .delete_data_source(&id)
            .map(|()| json!({ "deleted": id })),
    )
}

#[derive(Debug, Deserialize)]
struct SourceStatusBody {
    status: String,
}

async fn update_source_status(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Json(body): Json<SourceStatusBody>,
) -> Response {
    let Some(status) = SourceStatus::parse_name(&body.status) else {
        return fail(StatusCode::BAD_REQUEST, "status must be active, paused, or error");
    };
    respond(
        state
            .engine
            .store()
            .update_source_status(&id, status)
            .map(|()| json!({ "id": id, "status": status })),
    )
}

#[derive(Debug, Deserialize)]
struct IngestBody {
    items: Vec<IngestItem>,
    #[serde(default)]
    checkpoint: Option<String>,
}

async fn ingest_source(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Json(body): Json<IngestBody>,
) -> Response {
    let result = state
        .engine
        .ingestor()
        .ingest_batch(&id, body.items, body.checkpoint)
        .await;
    respond(result.and_then(|report| {
        serde_json::to_value(&report).map_err(|e| CoreError::internal(e.to_string()))
    }))
}

#[derive(Debug, Deserialize)]
struct ChatIngestBody {
    #[serde(default)]
    session_id: Option<String>,
    messages: Vec<ChatIngestMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatIngestMessage {
    #[serde(default)]
    role: Option<String>,
    content: String,
}

/// Map a chat transcript onto the standard ingestion path, one memory per
/// message.
async fn ingest_chat(
    State(state): State<HttpState>,
    Json(body): Json<ChatIngestBody>,
) -> Response {
    let mut stored = 0usize;
    let mut skipped = 0usize;
    for message in body.messages {
        if message.content.trim().is_empty() {
            skipped += 1;
            continue;
        }
        let role = message.role.unwrap_or_else(|| "user".to_string());
        let request = StoreMemoryRequest {
            content: message.content,
            session_id: body.session_id.clone(),
            source: Some(format!("chat:{role}")),
            tags: vec!["chat".to_string()],
            ..Default::default()
        };
        match state.engine.ingestor().store(request).await {
            Ok(_) => stored += 1,
            Err(err) => return error_response(err),
        }
    }
    ok(json!({ "stored": stored, "skipped": skipped }))
}

// ============================================================================
// TESTS
// ============================================================================
