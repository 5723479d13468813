use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use bazaar_db::DbError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    NotAuthenticated,

    #[error("Not allowed: {0}")]
    NotAuthorized(String),

    #[error("Not found")]
    NotFound,

    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Internal error: {0}")]
    Transient(String),
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound => ApiError::NotFound,
            DbError::NotAuthorized => ApiError::NotAuthorized("not a participant or owner".into()),
            DbError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            DbError::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Transient(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Transient(format!("spawn_blocking join error: {}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotAuthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::NotAuthorized(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::InvalidInput(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            ApiError::Transient(detail) => {
                error!("Request failed: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_statuses() {
        let cases = [
            (DbError::NotFound, StatusCode::NOT_FOUND),
            (DbError::NotAuthorized, StatusCode::FORBIDDEN),
            (DbError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (DbError::Conflict("x".into()), StatusCode::CONFLICT),
            (DbError::Lock("poisoned".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (db_err, status) in cases {
            assert_eq!(ApiError::from(db_err).into_response().status(), status);
        }
    }

    #[test]
    fn transient_detail_is_not_exposed() {
        let err = ApiError::Transient("disk I/O error at /var/lib".into());
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
