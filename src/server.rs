//! HTTP server.
//!
//! Exposes the [`DocQa`] operations as a JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/status` | Document and index status |
//! | `GET`    | `/files` | Stored PDF names |
//! | `PUT`    | `/files/{name}` | Upload a PDF (raw request body) and index it |
//! | `DELETE` | `/files/{name}` | Delete a stored PDF |
//! | `POST`   | `/reindex` | Rebuild the index from every stored PDF |
//! | `POST`   | `/ask` | Answer `{"question": ...}` for the caller |
//! | `GET`    | `/history` | The caller's past questions, newest first |
//!
//! The caller identity for `/ask` and `/history` comes from the
//! `x-user-id` header, which an authenticating proxy in front of this
//! server is expected to set.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "not found: manual.pdf" } }
//! ```
//!
//! Error codes: `bad_request`, `invalid_document_type`, `invalid_chunk_config`,
//! `no_documents` (400), `unauthorized` (401), `not_found` (404),
//! `unreadable_document` (422), `generation_failed` (502),
//! `embedding_unavailable` (503), `timeout` (504), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use docqa_core::models::UserIdentity;
use docqa_core::Error;

use crate::config::Config;
use crate::history::HistoryEntry;
use crate::service::{AskReport, DocQa, ReindexReport, StatusReport, UploadReport};

/// Header carrying the verified caller identity.
pub const USER_HEADER: &str = "x-user-id";

/// Largest accepted upload body.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Build the router over an already started service.
pub fn router(service: Arc<DocQa>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/files", get(handle_list_files))
        .route(
            "/files/{name}",
            put(handle_upload)
                .delete(handle_delete)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/reindex", post(handle_reindex))
        .route("/ask", post(handle_ask))
        .route("/history", get(handle_history))
        .layer(cors)
        .with_state(service)
}

/// Start the service and serve HTTP until Ctrl-C.
///
/// Binds to `[server].bind`. On shutdown, waits for any in-flight index
/// mutation to finish before returning.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(DocQa::open(config).await?);
    let app = router(Arc::clone(&service));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "docqa server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    service.shutdown().await;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
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
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code,
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::InvalidDocumentType(_) => (StatusCode::BAD_REQUEST, "invalid_document_type"),
            Error::InvalidChunkConfig { .. } => (StatusCode::BAD_REQUEST, "invalid_chunk_config"),
            Error::NoDocumentsToIndex => (StatusCode::BAD_REQUEST, "no_documents"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::UnreadableDocument { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unreadable_document")
            }
            Error::EmbeddingUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "embedding_unavailable")
            }
            Error::NotStarted => (StatusCode::SERVICE_UNAVAILABLE, "not_started"),
            Error::SynthesisTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            Error::Generation(_) => (StatusCode::BAD_GATEWAY, "generation_failed"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        app_error(status, code, err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{:#}", err), "request failed");
        app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", format!("{:#}", err))
    }
}

fn caller(headers: &HeaderMap) -> Result<UserIdentity, AppError> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(UserIdentity::new)
        .ok_or_else(|| {
            app_error(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                format!("missing {} header", USER_HEADER),
            )
        })
}

type AppState = State<Arc<DocQa>>;

// ============ Handlers ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_status(State(service): AppState) -> Result<Json<StatusReport>, AppError> {
    Ok(Json(service.get_status()?))
}

#[derive(Serialize)]
struct FilesResponse {
    files: Vec<String>,
}

async fn handle_list_files(State(service): AppState) -> Result<Json<FilesResponse>, AppError> {
    Ok(Json(FilesResponse {
        files: service.list_documents()?,
    }))
}

async fn handle_upload(
    State(service): AppState,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<UploadReport>, AppError> {
    if body.is_empty() {
        return Err(bad_request("request body must contain the PDF bytes"));
    }
    Ok(Json(service.upload_document(&name, body.to_vec()).await?))
}

#[derive(Serialize)]
struct DeleteResponse {
    deleted: String,
}

async fn handle_delete(
    State(service): AppState,
    Path(name): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    service.delete_document(&name).await?;
    Ok(Json(DeleteResponse { deleted: name }))
}

async fn handle_reindex(State(service): AppState) -> Result<Json<ReindexReport>, AppError> {
    Ok(Json(service.reindex().await?))
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

async fn handle_ask(
    State(service): AppState,
    headers: HeaderMap,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskReport>, AppError> {
    let user = caller(&headers)?;
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    Ok(Json(service.ask(&req.question, &user).await?))
}

#[derive(Serialize)]
struct HistoryResponse {
    entries: Vec<HistoryEntry>,
}

async fn handle_history(
    State(service): AppState,
    headers: HeaderMap,
) -> Result<Json<HistoryResponse>, AppError> {
    let user = caller(&headers)?;
    Ok(Json(HistoryResponse {
        entries: service.history(&user).await?,
    }))
}
