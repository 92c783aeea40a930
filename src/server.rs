//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Liveness message |
//! | `GET`  | `/status` | Readiness and index overview |
//! | `POST` | `/analyze` | `{"url": "..."}` → clone and index a repository |
//! | `POST` | `/chat` | `{"question": "..."}` → answer plus cited sources |
//!
//! # Error Contract
//!
//! Every error response has the same shape:
//!
//! ```json
//! { "error": { "code": "precondition_failed", "message": "Repository not analyzed yet. Please analyze a repository first." } }
//! ```
//!
//! | Code | Status | Cause |
//! |------|--------|-------|
//! | `bad_request` | 400 | empty question or URL |
//! | `precondition_failed` | 400 | chat before a successful analyze |
//! | `not_found` | 404 | index missing |
//! | `clone_failed` | 502 | git could not clone the URL |
//! | `provider_error` | 502 | embedding or LLM backend rejected the request |
//! | `provider_unavailable` | 503 | backend failure that may succeed on retry |
//! | `timeout` | 504 | the model did not answer in time |
//! | `internal` | 500 | configuration, IO or database failure |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser frontend
//! served from anywhere can call the API.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::CompanionError;
use crate::models::{AnalyzeReport, CitedSource};
use crate::pipeline::Companion;
use crate::status::Status;

pub const ROOT_MESSAGE: &str = "Codebase Companion Backend is running!";

/// Build the companion from `config` and serve on `[server].bind` until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let companion = Arc::new(Companion::from_config(config).await?);
    let listener = TcpListener::bind(&config.server.bind).await?;
    serve(listener, companion).await
}

/// Serve on an already bound listener.
pub async fn serve(listener: TcpListener, companion: Arc<Companion>) -> anyhow::Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "companion server listening");
    axum::serve(listener, router(companion)).await?;
    Ok(())
}

pub fn router(companion: Arc<Companion>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/status", get(handle_status))
        .route("/analyze", post(handle_analyze))
        .route("/chat", post(handle_chat))
        .layer(cors)
        .with_state(companion)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<CompanionError> for AppError {
    fn from(err: CompanionError) -> Self {
        let (status, code) = match &err {
            CompanionError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            CompanionError::Precondition(_) => (StatusCode::BAD_REQUEST, "precondition_failed"),
            CompanionError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            CompanionError::Clone { .. } => (StatusCode::BAD_GATEWAY, "clone_failed"),
            CompanionError::Provider { retryable: true, .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "provider_unavailable")
            }
            CompanionError::Provider { .. } => (StatusCode::BAD_GATEWAY, "provider_error"),
            CompanionError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            CompanionError::FileRead { .. }
            | CompanionError::Config(_)
            | CompanionError::Io(_)
            | CompanionError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!(error = %err, code, "request failed");
        } else {
            tracing::debug!(error = %err, code, "request rejected");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ GET / ============

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
}

async fn handle_root() -> Json<RootResponse> {
    Json(RootResponse {
        message: ROOT_MESSAGE,
    })
}

// ============ GET /status ============

async fn handle_status(State(companion): State<Arc<Companion>>) -> Result<Json<Status>, AppError> {
    Ok(Json(companion.status().await?))
}

// ============ POST /analyze ============

#[derive(Deserialize)]
struct AnalyzeRequest {
    url: String,
}

async fn handle_analyze(
    State(companion): State<Arc<Companion>>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeReport>, AppError> {
    Ok(Json(companion.analyze(&req.url).await?))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    question: String,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
    sources: Vec<CitedSource>,
}

async fn handle_chat(
    State(companion): State<Arc<Companion>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let answer = companion.chat(&req.question).await?;
    Ok(Json(ChatResponse {
        answer: answer.text,
        sources: answer.cited_sources,
    }))
}
