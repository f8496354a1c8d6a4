use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("{0}")]
    InvalidInput(&'static str),

    #[error("QR code not found")]
    NotFound,

    #[error("QR code is already claimed")]
    AlreadyClaimed,

    #[error("This QR code is not assigned to you.")]
    NotAssigned,

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::MalformedPayload | AppError::InvalidInput(_) | AppError::AlreadyClaimed => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::NotAssigned => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::Database(e) => {
                error!("Store failure: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}
