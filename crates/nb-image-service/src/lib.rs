//! Upload and static image service.
//!
//! `POST /upload/` stores an uploaded image in the input directory and
//! returns its absolute path; `GET /images/{file}` serves generated images
//! from the result directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Largest accepted upload body (50MB).
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// Directories the service reads from and writes to, as absolute paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceDirs {
    pub input_dir: PathBuf,
    pub result_dir: PathBuf,
}

impl ServiceDirs {
    /// Creates both directories if needed and resolves them to absolute paths.
    pub fn prepare(input_dir: &Path, result_dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(input_dir)?;
        std::fs::create_dir_all(result_dir)?;
        Ok(Self {
            input_dir: std::fs::canonicalize(input_dir)?,
            result_dir: std::fs::canonicalize(result_dir)?,
        })
    }
}

#[derive(Clone)]
struct AppState {
    input_dir: Arc<PathBuf>,
}

/// Response body for a stored upload.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Absolute path of the stored file on this host.
    pub file_path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to read multipart field: {0}")]
    Multipart(String),
    #[error("multipart field 'file' is required")]
    MissingFile,
    #[error("failed to store upload: {0}")]
    Storage(String),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Multipart(_) | Self::MissingFile => StatusCode::BAD_REQUEST,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "detail": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Builds the service router over prepared directories.
pub fn router(dirs: &ServiceDirs) -> Router {
    let state = AppState {
        input_dir: Arc::new(dirs.input_dir.clone()),
    };
    Router::new()
        .route("/", get(index_handler))
        .route("/upload/", post(upload_handler))
        .nest_service("/images", ServeDir::new(&dirs.result_dir))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Image service is running. Fetch images at /images/<filename> or upload with POST /upload/."
    }))
}

async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServiceError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::Multipart(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let extension = field
            .file_name()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServiceError::Multipart(e.to_string()))?;

        let path = state
            .input_dir
            .join(format!("{}{extension}", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| ServiceError::Storage(format!("{}: {e}", path.display())))?;
        info!(
            event = "upload.stored",
            domain = "image_service",
            path = %path.display(),
            bytes = bytes.len() as u64
        );
        return Ok(Json(UploadResponse {
            file_path: path.to_string_lossy().into_owned(),
        }));
    }
    Err(ServiceError::MissingFile)
}
