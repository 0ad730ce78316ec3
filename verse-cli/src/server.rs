//! HTTP surface for quote checks.
//!
//! | Route          | Response                                   |
//! |----------------|--------------------------------------------|
//! | `POST /check`  | `MatchResult` for `{"quote": "..."}`       |
//! | `GET /health`  | liveness                                   |
//! | `GET /status`  | stored count and, when known, readiness    |

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use verse_rag::{IndexState, MatchEngine, MatchResult, VerseError};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MatchEngine>,
    /// Corpus size, when the server was started with one.
    pub expected: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub quote: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub collection: String,
    pub stored: usize,
    pub expected: Option<usize>,
    pub state: Option<IndexState>,
}

/// A library error on its way to becoming an HTTP response.
pub struct ApiError(VerseError);

impl From<VerseError> for ApiError {
    fn from(e: VerseError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            VerseError::InvalidQuote(_) | VerseError::Validation(_) => StatusCode::BAD_REQUEST,
            VerseError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            VerseError::CollectionNotFound(_) => StatusCode::NOT_FOUND,
            VerseError::Embedding { .. } | VerseError::VectorStore { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            VerseError::Config(_) | VerseError::DimensionMismatch { .. } | VerseError::Corpus(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, error = %self.0, "request failed");
        } else {
            warn!(%status, error = %self.0, "request rejected");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/check", post(check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = app_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    info!("verse-check listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "verse-check" }))
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let engine = &state.engine;
    let (stored, readiness) = match state.expected {
        Some(expected) => {
            let readiness = engine.readiness(expected).await?;
            (readiness.stored, Some(readiness.state))
        }
        None => (engine.stored().await?, None),
    };
    Ok(Json(StatusResponse {
        collection: engine.collection().to_string(),
        stored,
        expected: state.expected,
        state: readiness,
    }))
}

async fn check(
    State(state): State<AppState>,
    Json(request): Json<CheckRequest>,
) -> Result<Json<MatchResult>, ApiError> {
    let result = state.engine.check(&request.quote).await?;
    info!(
        quote_chars = request.quote.chars().count(),
        matched = result.matched,
        score = result.score,
        reference = %result.reference,
        "quote checked"
    );
    Ok(Json(result))
}
