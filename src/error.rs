use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// The error taxonomy of §7: every client-visible failure maps to exactly
/// one of these variants. `ParseError` and `PersistenceError` are never
/// constructed on the request path proper — the interceptor logs and
/// swallows them instead (see `src/interceptor`), since accounting must
/// never block the client response.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Empty or unknown bearer token.
    #[error("Token Empty")]
    TokenEmpty,
    #[error("Token Invalid")]
    TokenInvalid,

    /// Caller authenticated but not the admin.
    #[error("Forbidden")]
    AdminOnly,

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::TokenEmpty => (StatusCode::UNAUTHORIZED, "Token Empty".to_string()),
            AppError::TokenInvalid => (StatusCode::UNAUTHORIZED, "Token Invalid".to_string()),
            AppError::AdminOnly => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Sqlx(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Reqwest(e) => {
                tracing::error!("Upstream HTTP client error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "Upstream service error".to_string(),
                )
            }
            AppError::Anyhow(e) => {
                tracing::error!("Error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": { "message": message } }));
        (status, body).into_response()
    }
}
