//! HTTP API.
//!
//! # Endpoints
//!
//! | Method   | Path | Description |
//! |----------|------|-------------|
//! | `POST`   | `/chat` (and `/chat/`) | Run a pipeline for a workflow |
//! | `POST`   | `/knowledgebase/upload-pdf/` | Multipart upload into a collection |
//! | `GET`    | `/knowledgebase/collections` | Collections with record counts |
//! | `GET`    | `/knowledgebase/collections/{name}/files` | Files indexed into a collection |
//! | `GET`    | `/knowledgebase/collections/{name}/files/{file_id}/download` | Stored bytes |
//! | `DELETE` | `/knowledgebase/collections/{name}/files/{file_id}` | Delete one file and its chunks |
//! | `DELETE` | `/knowledgebase/collections/{name}` | Delete a collection |
//! | `DELETE` | `/knowledgebase/reset-all/` | Wipe every collection and upload |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `execution_error` (500),
//! `internal` (500).
//!
//! CORS permits every origin, method and header.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart, TypedMultipartError};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use workflow_rag_core::models::{CollectionInfo, FileEntry};
use workflow_rag_core::{PipelineError, StoreError};

use crate::app::App;
use crate::chat::{ChatResponse, ChatService};
use crate::config::Config;
use crate::error::KnowledgeError;
use crate::ingest::{IngestReport, Upload};
use crate::knowledge::{DeletedFile, KnowledgeBase};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub knowledge: Arc<KnowledgeBase>,
}

impl From<&App> for AppState {
    fn from(app: &App) -> Self {
        Self {
            chat: app.chat.clone(),
            knowledge: app.knowledge.clone(),
        }
    }
}

/// Build the router. `max_upload_bytes` caps the multipart upload body.
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/chat/", post(handle_chat))
        .route(
            "/knowledgebase/upload-pdf/",
            post(handle_upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/knowledgebase/collections", get(handle_list_collections))
        .route(
            "/knowledgebase/collections/{name}",
            delete(handle_delete_collection),
        )
        .route(
            "/knowledgebase/collections/{name}/files",
            get(handle_list_files),
        )
        .route(
            "/knowledgebase/collections/{name}/files/{file_id}",
            delete(handle_delete_file),
        )
        .route(
            "/knowledgebase/collections/{name}/files/{file_id}/download",
            get(handle_download),
        )
        .route("/knowledgebase/reset-all/", delete(handle_reset_all))
        .layer(cors)
        .with_state(state)
}

/// Open the application described by `config` and serve it on
/// `[server].bind` until Ctrl-C.
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let app = App::open(config).await?;
    let router = build_router(AppState::from(&app), config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
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

/// Error type that renders as the JSON error body.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = self.code, message = %self.message, "Request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::MalformedRequest(msg) => AppError::bad_request(msg),
            err @ PipelineError::Generation { .. } => AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "execution_error",
                format!("error executing workflow: {}", err),
            ),
        }
    }
}

impl From<KnowledgeError> for AppError {
    fn from(err: KnowledgeError) -> Self {
        match err {
            KnowledgeError::MalformedRequest(msg) => AppError::bad_request(msg),
            KnowledgeError::NotFound(msg) => AppError::not_found(msg),
            KnowledgeError::Extraction(err) => AppError::bad_request(err.to_string()),
            KnowledgeError::Store(err @ StoreError::InvalidName(_)) => {
                AppError::bad_request(err.to_string())
            }
            KnowledgeError::Store(err @ StoreError::CollectionNotFound(_)) => {
                AppError::not_found(err.to_string())
            }
            other => AppError::internal(other.to_string()),
        }
    }
}

// ============ POST /chat ============

async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(body) = body.map_err(|e| AppError::bad_request(e.body_text()))?;
    Ok(Json(state.chat.handle(body).await?))
}

// ============ POST /knowledgebase/upload-pdf/ ============

#[derive(Debug, TryFromMultipart)]
pub struct UploadForm {
    pub collection_name: String,
    #[form_data(limit = "unlimited")]
    #[form_data(default)]
    pub files: Vec<FieldData<Bytes>>,
}

async fn handle_upload(
    State(state): State<AppState>,
    form: Result<TypedMultipart<UploadForm>, TypedMultipartError>,
) -> Result<Json<IngestReport>, AppError> {
    let TypedMultipart(form) = form.map_err(|e| AppError::bad_request(e.to_string()))?;

    let uploads = form
        .files
        .into_iter()
        .map(|field| {
            let filename = field.metadata.file_name.unwrap_or_default();
            Upload::new(filename, field.contents.to_vec())
        })
        .collect();

    let report = state
        .knowledge
        .ingest(form.collection_name.trim(), uploads)
        .await?;
    Ok(Json(report))
}

// ============ Collections ============

#[derive(Serialize)]
struct CollectionListResponse {
    collections: Vec<CollectionInfo>,
}

async fn handle_list_collections(
    State(state): State<AppState>,
) -> Result<Json<CollectionListResponse>, AppError> {
    let collections = state.knowledge.list_collections().await?;
    Ok(Json(CollectionListResponse { collections }))
}

#[derive(Serialize)]
struct FileListResponse {
    collection_name: String,
    files: Vec<FileEntry>,
}

async fn handle_list_files(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<FileListResponse>, AppError> {
    let files = state.knowledge.list_files(&name).await?;
    Ok(Json(FileListResponse {
        collection_name: name,
        files,
    }))
}

async fn handle_download(
    State(state): State<AppState>,
    Path((name, file_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let bytes = state.knowledge.download(&name, &file_id).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        file_id.replace(['"', '\\'], "_")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

async fn handle_delete_file(
    State(state): State<AppState>,
    Path((name, file_id)): Path<(String, String)>,
) -> Result<Json<DeletedFile>, AppError> {
    Ok(Json(state.knowledge.delete_file(&name, &file_id).await?))
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_delete_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.knowledge.delete_collection(&name).await?;
    Ok(Json(MessageResponse {
        message: format!("Collection '{}' deleted", name),
    }))
}

async fn handle_reset_all(State(state): State<AppState>) -> Result<Json<MessageResponse>, AppError> {
    state.knowledge.reset_all().await?;
    Ok(Json(MessageResponse {
        message: "All collections and uploads deleted".to_string(),
    }))
}
