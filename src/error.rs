use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Catalog authentication failed: {0}")]
    Auth(String),

    #[error("Transient catalog error: {message}")]
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Malformed catalog response: {0}")]
    Malformed(String),

    #[error("A recommendation run is already in progress")]
    RunInProgress,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn transient(message: impl Into<String>) -> Self {
        AppError::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Transient { .. } => true,
            AppError::HttpClient(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Whether the error ends a whole run rather than one unit of work.
    pub fn is_fatal(&self) -> bool {
        match self {
            AppError::Auth(_) => true,
            AppError::Database(e) => !matches!(e, sqlx::Error::RowNotFound),
            _ => false,
        }
    }

    /// Server-requested delay carried by a rate-limit response.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AppError::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::RunInProgress => (StatusCode::CONFLICT, self.to_string()),
            AppError::Database(_)
            | AppError::Cache(_)
            | AppError::Cancelled
            | AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::ExternalApi(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::HttpClient(_)
            | AppError::Auth(_)
            | AppError::Transient { .. }
            | AppError::Malformed(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AppError::transient("503").is_transient());
        assert!(!AppError::NotFound("album".to_string()).is_transient());
        assert!(!AppError::Malformed("bad json".to_string()).is_transient());
        assert!(!AppError::Auth("rejected".to_string()).is_transient());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(AppError::Auth("rejected".to_string()).is_fatal());
        assert!(AppError::Database(sqlx::Error::PoolTimedOut).is_fatal());
        assert!(!AppError::Database(sqlx::Error::RowNotFound).is_fatal());
        assert!(!AppError::transient("429").is_fatal());
        assert!(!AppError::NotFound("artist".to_string()).is_fatal());
    }

    #[test]
    fn test_retry_after_only_on_transient() {
        let err = AppError::Transient {
            message: "rate limited".to_string(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(AppError::Cancelled.retry_after(), None);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::RunInProgress.into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::NotFound("run".to_string()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Auth("rejected".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
