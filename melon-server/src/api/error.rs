use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use melon_types::ErrorResponse;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing detail line. Internal errors are logged in full
    /// and masked in the body.
    fn details(self) -> String {
        match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::TooManyRequests(msg) => msg,
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An unexpected error occurred".to_string()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            details: Some(self.details()),
        };

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::NotFound("x".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::TooManyRequests("x".to_string()).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_internal_details_are_masked() {
        let details = ApiError::InternalError("db exploded".to_string()).details();
        assert_eq!(details, "An unexpected error occurred");
    }
}
