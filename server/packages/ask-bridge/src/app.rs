use std::sync::Arc;

use ask_bridge_error::BridgeError;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::agent::{normalize_agent_result, Agent};
use crate::bridge::{BridgeConfig, ChunkSource, StreamSession};

pub struct AppState {
    pub agent: Arc<dyn Agent>,
    pub stream_source: Arc<dyn ChunkSource>,
    pub bridge: BridgeConfig,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/ask", post(post_ask))
        .route("/ask_sse_post", post(post_ask_sse))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

async fn post_ask(State(state): State<Arc<AppState>>, Json(body): Json<AskRequest>) -> Response {
    let agent = state.agent.clone();
    let prompt = body.prompt;
    let outcome = tokio::task::spawn_blocking(move || agent.invoke(&prompt)).await;

    match outcome {
        Ok(Ok(value)) => Json(AskResponse {
            response: normalize_agent_result(&value),
        })
        .into_response(),
        Ok(Err(err)) => {
            tracing::error!(error = %err, kind = err.error_type().title(), "agent failed");
            error_response(BridgeError::upstream(format!("Agent error: {err}")))
        }
        Err(err) => {
            tracing::error!(error = %err, "agent task aborted");
            error_response(BridgeError::upstream(format!("Agent error: {err}")))
        }
    }
}

async fn post_ask_sse(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QuestionRequest>,
) -> Response {
    let question = body.question.trim();
    if question.is_empty() {
        return error_response(BridgeError::format("Empty question."));
    }

    let session = StreamSession::spawn(
        state.stream_source.clone(),
        question.to_string(),
        state.bridge.clone(),
    );
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(session.into_body_stream()),
    )
        .into_response()
}

fn error_response(err: BridgeError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.to_error_detail())).into_response()
}
