use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("inference backend request failed: {0}")]
    Backend(#[from] reqwest::Error),
    #[error("inference backend returned {0}")]
    BackendStatus(StatusCode),
}

impl IntoResponse for ServiceError {
    // The relay never synthesizes an error payload; callers only see the status.
    fn into_response(self) -> Response {
        let status = match self {
            ServiceError::Backend(_) | ServiceError::BackendStatus(_) => StatusCode::BAD_GATEWAY,
        };
        status.into_response()
    }
}
