// ABOUTME: HTTP transport for long polling: GET /events plus chat posting, health, and metrics
// ABOUTME: Maps headers and query strings onto WaitCoordinator::handle_poll and the chat store

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use roompoll_core::{
    config::{Config, ServerConfig},
    Cursor, LongPollingEvent, RoomId, SourceCatalog, SourceContext, SourceRegistry,
    TracingReporter, UserId, WaitCoordinator,
};
use roompoll_source::sources::chat::ChatStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Header carrying the authenticated user
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header selecting the room; falls back to the configured default room
pub const ROOM_ID_HEADER: &str = "x-room-id";

/// Shared state behind every route
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<WaitCoordinator>,
    pub chat: ChatStore,
    pub default_room: RoomId,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Build sources from config, initialize them, and wire the coordinator
    pub async fn from_config(config: &Config, metrics: Option<PrometheusHandle>) -> Result<Self> {
        let ctx = SourceContext::new();
        let registry = SourceRegistry::from_configs(
            &SourceCatalog::default(),
            &ctx,
            &config.sources,
            &TracingReporter,
        )
        .await
        .context("Failed to build event sources")?;

        let coordinator = WaitCoordinator::new(Arc::new(registry), config.poll.wait_timeout());

        Ok(Self {
            coordinator: Arc::new(coordinator),
            chat: ctx.chat,
            default_room: RoomId::from(config.server.default_room.as_str()),
            metrics,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub timestamp: Option<String>,
}

/// Poll response envelope
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PollResponse {
    pub events: Vec<LongPollingEvent>,
    /// Cursor for the next poll, as a decimal string
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostMessageResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub sources: Vec<String>,
}

/// Build the router. `/metrics` is mounted only when a handle is present.
pub fn router(state: AppState) -> Router {
    let metrics_routes = match state.metrics.clone() {
        Some(handle) => Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(Arc::new(handle)),
        None => Router::new(),
    };

    Router::new()
        .route("/events", get(poll_events))
        .route("/rooms/{room_id}/messages", post(post_message))
        .route("/health", get(health))
        .with_state(state)
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
}

/// Bind the listener and serve until Ctrl+C
pub async fn serve(server: &ServerConfig, state: AppState) -> Result<()> {
    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(
        addr = %addr,
        wait_timeout_secs = state.coordinator.wait_timeout().as_secs(),
        sources = ?state.coordinator.registry().names(),
        "Long-polling server listening"
    );

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received shutdown signal");
    };

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Long-poll for events newer than `timestamp`
async fn poll_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EventsQuery>,
) -> Response {
    let Some(user_id) = header_value(&headers, USER_ID_HEADER) else {
        return error_response(StatusCode::UNAUTHORIZED, "Missing X-User-Id header");
    };
    let room_id = header_value(&headers, ROOM_ID_HEADER)
        .map(RoomId::from)
        .unwrap_or_else(|| state.default_room.clone());

    let since = match query.timestamp.as_deref().map(str::parse::<Cursor>) {
        Some(Ok(cursor)) => cursor,
        Some(Err(e)) => {
            tracing::debug!(error = %e, "Rejected poll with invalid timestamp");
            return error_response(
                StatusCode::BAD_REQUEST,
                "timestamp must be an integer cursor",
            );
        }
        None => return error_response(StatusCode::BAD_REQUEST, "Missing timestamp parameter"),
    };

    let result = state
        .coordinator
        .handle_poll(UserId::from(user_id), room_id, since)
        .await;

    Json(PollResponse {
        events: result.events,
        timestamp: result.cursor.to_string(),
    })
    .into_response()
}

/// Post a chat message into a room, waking any poll waiting on it
async fn post_message(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<PostMessageRequest>,
) -> Response {
    let Some(author) = header_value(&headers, USER_ID_HEADER) else {
        return error_response(StatusCode::UNAUTHORIZED, "Missing X-User-Id header");
    };

    match state
        .chat
        .post(&RoomId::from(room_id.as_str()), &UserId::from(author), &payload.text)
    {
        Ok(message) => Json(PostMessageResponse {
            success: true,
            timestamp: Some(message.posted_at.to_string()),
            message: None,
        })
        .into_response(),
        Err(e) => {
            tracing::warn!(room_id = %room_id, error = %e, "Rejected chat message");
            (
                StatusCode::BAD_REQUEST,
                Json(PostMessageResponse {
                    success: false,
                    timestamp: None,
                    message: Some(e.to_string()),
                }),
            )
                .into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        sources: state.coordinator.registry().names(),
    })
}

async fn metrics_handler(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
