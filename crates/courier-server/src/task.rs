//! HTTP endpoints used by task pages: server clock and HIT configuration.

use std::path::PathBuf;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::server::AppState;

/// Body of `GET /get_timestamp`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TimestampResponse {
    /// Unix time in milliseconds.
    pub timestamp: i64,
}

/// Failure to serve the HIT configuration.
#[derive(Debug, Error)]
pub enum TaskFileError {
    /// The file does not exist.
    #[error("task file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// The file exists but could not be read.
    #[error("failed to read task file: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid JSON.
    #[error("task file is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl IntoResponse for TaskFileError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Io(_) | Self::InvalidJson(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(error = %self, "task file request failed");
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// GET /get_timestamp
pub async fn get_timestamp() -> Json<TimestampResponse> {
    Json(TimestampResponse {
        timestamp: chrono::Utc::now().timestamp_millis(),
    })
}

/// GET /get_hit_config
pub async fn get_hit_config(State(state): State<AppState>) -> Result<Json<Value>, TaskFileError> {
    load_json(state.config.hit_config_path()).await.map(Json)
}

/// Read and parse a JSON file.
pub async fn load_json(path: PathBuf) -> Result<Value, TaskFileError> {
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TaskFileError::NotFound(path));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&content)?)
}
