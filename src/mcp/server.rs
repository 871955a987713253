//! MCP tool server over streamable HTTP
//!
//! `POST /mcp` carries one JSON-RPC message per request and always answers
//! with a plain JSON body. Sessions are created on `initialize` and ended
//! with `DELETE /mcp`.

use super::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use super::types::{PROTOCOL_VERSION, SESSION_HEADER, SUPPORTED_PROTOCOL_VERSIONS};
use super::McpToolResult;
use crate::config::ServerConfig;
use crate::storage::{InteractionLog, RecordStore};
use crate::tools::{ToolRegistry, ToolResult};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const SERVER_NAME: &str = "sqlmcp";

/// Sessions not used for this long are dropped when a new one is opened
pub const SESSION_IDLE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug)]
struct SessionInfo {
    protocol_version: String,
    created: Instant,
    last_seen: Instant,
}

/// Shared server state
pub struct McpServerState {
    registry: ToolRegistry,
    sessions: DashMap<String, SessionInfo>,
}

impl McpServerState {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            sessions: DashMap::new(),
        }
    }

    /// Open the record store at `config.db_path` and register its tools
    pub fn open(config: &ServerConfig) -> Result<Self> {
        let store = Arc::new(RecordStore::open(&config.db_path)?);
        let log = InteractionLog::new(&config.db_path);
        let registry = ToolRegistry::for_store(store, log, config.raw_sql);
        Ok(Self::new(registry))
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop sessions idle for longer than `ttl`, returning how many went
    pub fn expire_idle_sessions(&self, ttl: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, info| info.last_seen.elapsed() < ttl);
        let expired = before.saturating_sub(self.sessions.len());
        if expired > 0 {
            tracing::info!("Expired {} idle MCP sessions", expired);
        }
        expired
    }

    fn open_session(&self, protocol_version: String) -> String {
        self.expire_idle_sessions(SESSION_IDLE_TTL);
        let session_id = uuid::Uuid::new_v4().to_string();
        let now = Instant::now();
        self.sessions.insert(
            session_id.clone(),
            SessionInfo {
                protocol_version,
                created: now,
                last_seen: now,
            },
        );
        session_id
    }

    /// Handle one parsed JSON-RPC message
    pub async fn dispatch(&self, req: &JsonRpcRequest) -> JsonRpcResponse {
        tracing::debug!("Dispatching method: {}", req.method);

        match req.method.as_str() {
            "initialize" => self.handle_initialize(req),
            "notifications/initialized" => {
                tracing::debug!("Client initialized");
                JsonRpcResponse::success(req.id.clone(), json!({}))
            }
            "ping" => JsonRpcResponse::success(req.id.clone(), json!({})),
            "tools/list" => self.handle_tools_list(req),
            "tools/call" => self.handle_tools_call(req).await,
            method if method.starts_with("notifications/") => {
                JsonRpcResponse::success(req.id.clone(), json!({}))
            }
            _ => JsonRpcResponse::method_not_found(req.id.clone(), &req.method),
        }
    }

    fn handle_initialize(&self, req: &JsonRpcRequest) -> JsonRpcResponse {
        let requested = req
            .params
            .get("protocolVersion")
            .and_then(|v| v.as_str())
            .unwrap_or(PROTOCOL_VERSION);
        let version = if SUPPORTED_PROTOCOL_VERSIONS.contains(&requested) {
            requested
        } else {
            PROTOCOL_VERSION
        };
        let client = req
            .params
            .pointer("/clientInfo/name")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        tracing::info!("MCP initialize from '{}' (protocol {})", client, version);

        JsonRpcResponse::success(
            req.id.clone(),
            json!({
                "protocolVersion": version,
                "capabilities": {
                    "tools": { "listChanged": false }
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    fn handle_tools_list(&self, req: &JsonRpcRequest) -> JsonRpcResponse {
        let tools: Vec<Value> = self
            .registry
            .definitions()
            .into_iter()
            .map(|def| {
                json!({
                    "name": def.name,
                    "description": def.description,
                    "inputSchema": def.parameters
                })
            })
            .collect();
        JsonRpcResponse::success(req.id.clone(), json!({ "tools": tools }))
    }

    async fn handle_tools_call(&self, req: &JsonRpcRequest) -> JsonRpcResponse {
        let Some(name) = req.params.get("name").and_then(|v| v.as_str()) else {
            return JsonRpcResponse::invalid_params(req.id.clone(), "Missing tool name");
        };
        if self.registry.get(name).is_none() {
            return JsonRpcResponse::invalid_params(
                req.id.clone(),
                format!("Unknown tool: {}", name),
            );
        }
        let arguments = req
            .params
            .get("arguments")
            .cloned()
            .filter(|a| !a.is_null())
            .unwrap_or_else(|| json!({}));

        let result = match self.registry.execute(name, arguments).await {
            Ok(result) => to_mcp_result(result),
            Err(e) => McpToolResult::text(e.to_string(), true),
        };

        match serde_json::to_value(&result) {
            Ok(value) => JsonRpcResponse::success(req.id.clone(), value),
            Err(e) => JsonRpcResponse::internal_error(req.id.clone(), e.to_string()),
        }
    }
}

fn to_mcp_result(result: ToolResult) -> McpToolResult {
    match (result.success, result.data) {
        (true, Some(data)) => McpToolResult::value(data),
        (success, _) => McpToolResult::text(result.output, !success),
    }
}

/// Build the router for `/mcp` and `/health`
pub fn router(state: Arc<McpServerState>) -> Router {
    Router::new()
        .route(
            "/mcp",
            post(handle_post).get(handle_get).delete(handle_delete),
        )
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers([HeaderName::from_static(SESSION_HEADER)]),
        )
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: Arc<McpServerState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Tool server failed")
}

/// Run the tool server until Ctrl+C
pub async fn run_tool_server(config: &ServerConfig) -> Result<()> {
    let state = Arc::new(McpServerState::open(config)?);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(
        "MCP tool server listening on http://{}/mcp (database: {}, tools: {})",
        addr,
        config.db_path.display(),
        state.registry().names().join(", ")
    );

    serve(listener, state, shutdown_signal()).await
}

pub(crate) async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

fn json_rpc(status: StatusCode, body: JsonRpcResponse) -> Response {
    (status, Json(body)).into_response()
}

async fn handle_post(
    State(state): State<Arc<McpServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return json_rpc(StatusCode::BAD_REQUEST, JsonRpcResponse::parse_error(e)),
    };
    if value.is_array() {
        return json_rpc(
            StatusCode::BAD_REQUEST,
            JsonRpcResponse::invalid_request(Value::Null, "Batch requests are not supported"),
        );
    }
    let req: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            return json_rpc(
                StatusCode::BAD_REQUEST,
                JsonRpcResponse::invalid_request(Value::Null, format!("Invalid request: {}", e)),
            )
        }
    };

    if let Some(session) = session_header(&headers) {
        let known = match state.sessions.get_mut(session) {
            Some(mut info) => {
                info.last_seen = Instant::now();
                true
            }
            None => false,
        };
        if req.method != "initialize" && !known {
            return json_rpc(
                StatusCode::NOT_FOUND,
                JsonRpcResponse::invalid_request(req.id.clone(), "Unknown session"),
            );
        }
    }

    if req.is_notification() {
        state.dispatch(&req).await;
        return StatusCode::ACCEPTED.into_response();
    }

    let response = state.dispatch(&req).await;

    if req.method == "initialize" && response.error.is_none() {
        let protocol_version = response
            .result
            .as_ref()
            .and_then(|r| r.get("protocolVersion"))
            .and_then(|v| v.as_str())
            .unwrap_or(PROTOCOL_VERSION)
            .to_string();
        let session_id = state.open_session(protocol_version);

        let mut resp = json_rpc(StatusCode::OK, response);
        match HeaderValue::from_str(&session_id) {
            Ok(value) => {
                resp.headers_mut()
                    .insert(HeaderName::from_static(SESSION_HEADER), value);
            }
            Err(e) => tracing::warn!("Invalid session id header: {}", e),
        }
        return resp;
    }

    json_rpc(StatusCode::OK, response)
}

async fn handle_get() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST, DELETE")],
    )
        .into_response()
}

async fn handle_delete(State(state): State<Arc<McpServerState>>, headers: HeaderMap) -> Response {
    let Some(session) = session_header(&headers) else {
        return (StatusCode::BAD_REQUEST, "Missing session id").into_response();
    };
    match state.sessions.remove(session) {
        Some((id, info)) => {
            tracing::info!(
                "Closed MCP session {} (protocol {}, open {:.1}s)",
                id,
                info.protocol_version,
                info.created.elapsed().as_secs_f64()
            );
            StatusCode::OK.into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    tools: Vec<String>,
}

async fn health_check(State(state): State<Arc<McpServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        tools: state.registry.names(),
    })
}
