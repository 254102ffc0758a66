use crate::vector_index::IndexError;
use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use color_eyre::eyre;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no file was uploaded in the `file` field")]
    MissingFile,

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("the uploaded file is not a decodable image: {0}")]
    InvalidImage(String),

    #[error("vector index error")]
    Index(#[from] IndexError),

    #[error("internal error")]
    Internal(#[from] eyre::Report),
}

fn log_error(error: &LookupError) {
    match error {
        LookupError::MissingFile | LookupError::Multipart(_) | LookupError::InvalidImage(_) => {}
        LookupError::Index(e) => error!("Face index query failed: {}", e),
        LookupError::Internal(e) => error!("Internal error: {:?}", e),
    }
}

impl IntoResponse for LookupError {
    fn into_response(self) -> Response {
        log_error(&self);

        let (status, error_message) = match &self {
            Self::MissingFile | Self::Multipart(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::InvalidImage(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            Self::Index(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "The face index could not be queried.".to_string(),
            ),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected internal error occurred.".to_string(),
            ),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

impl From<tokio::task::JoinError> for LookupError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(eyre::Report::new(err))
    }
}
