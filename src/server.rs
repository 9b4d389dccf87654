// ABOUTME: HTTP gateway — validates chat and speech requests and hands them to the orchestrator.
// ABOUTME: Serves /api/chat, /api/tts (alias /api/nova-speech), /health, and optional static assets.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::handler::HandlerWithoutStateExt;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::dispatch::DispatchStats;
use crate::error::ApiError;
use crate::orchestrator::{TurnOrchestrator, TurnRequest};
use crate::session::ImageRef;

/// Shared state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TurnOrchestrator>,
    pub default_session_key: Arc<str>,
    pub generate_timeout: Duration,
    pub speech_timeout: Duration,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<TurnOrchestrator>, config: &Config) -> Self {
        Self {
            orchestrator,
            default_session_key: Arc::from(config.session.default_key.as_str()),
            generate_timeout: config.dispatch.generate_timeout(),
            speech_timeout: config.dispatch.speech_timeout(),
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub session_id: Option<String>,
    pub image_data: Option<String>,
    pub local_time: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SpeechResponse {
    pub audio_data: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub started_at: String,
    pub uptime_secs: i64,
    pub sessions: usize,
    pub messages: usize,
    pub dispatch: DispatchStats,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, config: &Config) -> Router {
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/tts", post(speech_handler))
        .route("/api/nova-speech", post(speech_handler))
        .with_state(state);

    let router = match &config.server.static_dir {
        Some(dir) => router.fallback_service(
            ServeDir::new(dir).not_found_service(not_found_handler.into_service()),
        ),
        None => router.fallback(not_found_handler),
    };

    let router = router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http());
    if config.server.cors_permissive {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::InvalidBody(e.body_text()))?;
    let message = non_blank(request.message)
        .ok_or_else(|| ApiError::BadRequest("No message provided".to_string()))?;
    let session_key =
        non_blank(request.session_id).unwrap_or_else(|| state.default_session_key.to_string());
    let image = request.image_data.as_deref().and_then(ImageRef::from_payload);

    let response = state
        .orchestrator
        .handle(TurnRequest {
            session_key,
            text: message,
            image,
            local_time: request.local_time,
            timeout: state.generate_timeout,
        })
        .await;

    Ok(Json(ChatResponse {
        response,
        status: "success",
    }))
}

async fn speech_handler(
    State(state): State<AppState>,
    payload: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Json<SpeechResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::InvalidBody(e.body_text()))?;
    let text = request
        .text
        .ok_or_else(|| ApiError::BadRequest("No text provided".to_string()))?;

    let audio = state
        .orchestrator
        .pool()
        .submit_speech(&text, state.speech_timeout)
        .await
        .ok_or(ApiError::SpeechUnavailable)?;

    Ok(Json(SpeechResponse {
        audio_data: BASE64.encode(&audio),
        status: "success",
    }))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.orchestrator.store();
    Json(HealthResponse {
        status: "ok",
        started_at: state.started_at.to_rfc3339(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        sessions: store.session_count(),
        messages: store.message_count(),
        dispatch: state.orchestrator.pool().stats(),
    })
}

async fn not_found_handler() -> ApiError {
    ApiError::NotFound
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else {
        "handler panicked".to_string()
    };
    ApiError::Internal(anyhow::anyhow!(details)).into_response()
}
