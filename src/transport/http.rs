//! HTTP chat front-end: the chat page plus its JSON API

use super::page::CHAT_PAGE_HTML;
use super::render::render_interactions;
use crate::agent::{ChatMessage, ChatSession, SessionFactory};
use crate::config::Config;
use crate::llm::{LlmProvider, OllamaProvider};
use crate::mcp::server::shutdown_signal;
use crate::storage::{Interaction, InteractionSink};
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Session used when a request names none
pub const DEFAULT_SESSION: &str = "default";

/// Chat sessions untouched for this long are dropped when a new one starts
pub const SESSION_IDLE_TTL: Duration = Duration::from_secs(2 * 60 * 60);

struct SessionEntry {
    session: Arc<Mutex<ChatSession>>,
    last_used: Instant,
}

/// Shared application state
pub struct AppState {
    sessions: DashMap<String, SessionEntry>,
    factory: SessionFactory,
    model: String,
    server_url: String,
    recent_limit: usize,
    idle_ttl: Duration,
}

impl AppState {
    pub fn new(factory: SessionFactory, config: &Config) -> Self {
        Self {
            sessions: DashMap::new(),
            factory,
            model: config.llm.ollama.model.clone(),
            server_url: config.chat.server_url.clone(),
            recent_limit: config.chat.recent_limit,
            idle_ttl: SESSION_IDLE_TTL,
        }
    }

    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = ttl;
        self
    }

    /// Get the session for `id`, creating it on first use
    ///
    /// Creating a session first evicts every other session idle for longer
    /// than the idle TTL.
    pub fn session(&self, id: &str) -> Arc<Mutex<ChatSession>> {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            entry.last_used = Instant::now();
            return entry.session.clone();
        }

        self.evict_idle();
        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!("New chat session {}", id);
                SessionEntry {
                    session: Arc::new(Mutex::new(self.factory.create(id))),
                    last_used: Instant::now(),
                }
            })
            .session
            .clone()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn evict_idle(&self) {
        let ttl = self.idle_ttl;
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| entry.last_used.elapsed() < ttl);
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            tracing::info!("Evicted {} idle chat sessions", evicted);
        }
    }

    async fn recent_html(&self) -> String {
        let recent = self.factory.sink().recent(self.recent_limit).await;
        render_interactions(&recent)
    }
}

/// Request for chat
#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

/// Request for clearing a session
#[derive(Debug, Default, Deserialize)]
struct ClearRequest {
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    history: Vec<ChatMessage>,
    reply: String,
    recent_html: String,
    tool_calls: Vec<crate::agent::ToolCallLog>,
    elapsed_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<crate::llm::TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClearResponse {
    history: Vec<ChatMessage>,
    recent_html: String,
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    #[serde(default)]
    limit: Option<usize>,
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    model: String,
    tool_server: String,
    tools: Vec<String>,
    sessions: usize,
}

/// Build the router for the page and `/api/*`
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/chat", post(handle_chat))
        .route("/api/clear", post(handle_clear))
        .route("/api/interactions", get(recent_interactions))
        .route("/api/interactions/html", get(recent_interactions_html))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Chat server failed")
}

/// Connect to the tool server, then serve the chat UI until Ctrl+C
///
/// Fails before binding if the tool server cannot be reached.
pub async fn run_chat_server(config: &Config) -> Result<()> {
    let provider = OllamaProvider::from_config(&config.llm.ollama)?;
    match provider.list_models().await {
        Ok(models) if !models.iter().any(|m| m.name.starts_with(provider.model())) => {
            tracing::warn!(
                "Model '{}' is not pulled in Ollama; run `ollama pull {}`",
                provider.model(),
                provider.model()
            );
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(
            "Ollama is not reachable at {} ({:#}); turns will fail until it is",
            config.llm.ollama.base_url,
            e
        ),
    }
    let llm: Arc<dyn LlmProvider> = Arc::new(provider);

    let factory = SessionFactory::connect(config, llm).await?;
    let state = Arc::new(AppState::new(factory, config));

    let addr: SocketAddr = format!("{}:{}", config.chat.host, config.chat.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.chat.host, config.chat.port
            )
        })?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(
        "Chat UI listening on http://{} (model: {}, tool server: {})",
        addr,
        config.llm.ollama.model,
        config.chat.server_url
    );

    let result = serve(listener, state.clone(), shutdown_signal()).await;
    state.factory.close().await;
    result
}

async fn index() -> Html<&'static str> {
    Html(CHAT_PAGE_HTML)
}

fn session_id(requested: Option<String>) -> String {
    requested
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION.to_string())
}

async fn handle_chat(State(state): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> Response {
    let message = req.message.trim();
    if message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "message must not be empty" })),
        )
            .into_response();
    }

    let id = session_id(req.session_id);
    let session = state.session(&id);

    // Turns within one session run one at a time
    let (outcome, history) = {
        let mut session = session.lock().await;
        let outcome = session.handle_turn(message).await;
        (outcome, session.history().to_vec())
    };

    let recent_html = state.recent_html().await;
    Json(ChatResponse {
        history,
        reply: outcome.reply,
        recent_html,
        tool_calls: outcome.tool_calls,
        elapsed_secs: outcome.elapsed_secs,
        usage: outcome.usage,
        error: outcome.error,
    })
    .into_response()
}

async fn handle_clear(
    State(state): State<Arc<AppState>>,
    body: Option<Json<ClearRequest>>,
) -> Json<ClearResponse> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let id = session_id(req.session_id);

    let existing = state.sessions.get(&id).map(|e| e.session.clone());
    if let Some(session) = existing {
        session.lock().await.clear();
        tracing::info!("Cleared chat session {}", id);
    }

    Json(ClearResponse {
        history: Vec::new(),
        recent_html: state.recent_html().await,
    })
}

async fn recent_interactions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Json<Vec<Interaction>> {
    let limit = query.limit.unwrap_or(state.recent_limit);
    Json(state.factory.sink().recent(limit).await)
}

async fn recent_interactions_html(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Html<String> {
    let limit = query.limit.unwrap_or(state.recent_limit);
    let recent = state.factory.sink().recent(limit).await;
    Html(render_interactions(&recent))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.model.clone(),
        tool_server: state.server_url.clone(),
        tools: state.factory.tools().names(),
        sessions: state.session_count(),
    })
}
