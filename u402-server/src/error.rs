//! Error types of the API handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use u402::quote::QuoteError;

/// Errors returned by the non-gated endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A required field is missing or has the wrong shape.
    #[error("{0}")]
    BadRequest(String),

    /// The amount cannot be quoted.
    #[error("cannot quote amount: {0}")]
    Quote(#[from] QuoteError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (StatusCode::BAD_REQUEST, axum::Json(body)).into_response()
    }
}
