use crate::auth::AuthError;
use crate::models::ValidationError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Erreurs terminales pour une requête ; rendues en `{status:"error", message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("malformed request body: {0}")]
    BadRequest(String),
    #[error("invalid client secret")]
    BadIngestToken,
    #[error("client not found: {0}")]
    NotFound(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(AuthError::PasswordMismatch | AuthError::EmptyPassword) => StatusCode::BAD_REQUEST,
            ApiError::Auth(AuthError::Hash(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Auth(_) | ApiError::BadIngestToken => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "status": "error", "message": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}
