use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::db::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Todo not found")]
    NotFound,

    #[error("Failed to create Todo")]
    CreateFailed,

    #[error("There are missing or extra fields")]
    UnknownFields,

    #[error("Todo ID does not match ID in JSON object")]
    IdMismatch,

    #[error("Todo title must not be empty")]
    EmptyTitle,

    #[error("{0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Internal(source) => tracing::error!(error = %source, "store failure"),
            _ => tracing::debug!(error = %self, status = status.as_u16(), "request rejected"),
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
