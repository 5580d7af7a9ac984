//! Minimal HTTP front built on axum.
//!
//! `GET /health` reports liveness. `POST /extract` takes a JSON string, truncates it to
//! the configured character limit and runs the configured attributor on it.

use crate::attributor::ObjectAttributor;
use crate::config::ServerConfig;
use crate::types::ObjectAttribution;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state for the handlers.
#[derive(Clone)]
pub struct AppState {
    attributor: Arc<dyn ObjectAttributor>,
    text_max_len: usize,
}

impl AppState {
    pub fn new(attributor: Arc<dyn ObjectAttributor>, text_max_len: usize) -> Self {
        Self {
            attributor,
            text_max_len: text_max_len.max(1),
        }
    }
}

/// Body of a successful `/extract` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub result: ObjectAttribution,
    pub input_text_truncated: bool,
}

/// Cut `text` to at most `max_chars` characters. Returns whether anything was cut.
pub fn truncate_input(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

/// Build an axum Router with `/health` and `/extract` routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/extract", post(extract_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn extract_handler(State(state): State<AppState>, Json(text): Json<String>) -> Response {
    let (text, input_text_truncated) = truncate_input(&text, state.text_max_len);
    if input_text_truncated {
        info!(max_len = state.text_max_len, "Input text truncated");
    }

    match state.attributor.attribute(text).await {
        Ok(result) => Json(ExtractResponse {
            result,
            input_text_truncated,
        })
        .into_response(),
        Err(e) => {
            warn!(attributor = state.attributor.name(), error = %e, "Extraction failed");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Serve on the configured address until Ctrl-C.
pub async fn run(config: &ServerConfig, state: AppState) -> Result<(), std::io::Error> {
    let app = router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP front listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
