use axum::{http::StatusCode, response::IntoResponse};
use serde_json::{Value, json};
use thiserror::Error;

use super::problem::ProblemDetails;

pub type AppResult<T> = Result<T, ApiError>;

/// Route-level failure. Each variant pins the HTTP status and the
/// stable machine code its problem+json body carries.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },
    #[error("{0}")]
    DatabaseUnavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Rejects one request field, naming it in the problem details.
    pub fn missing_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: Some(json!({ "field": field })),
        }
    }

    pub fn database_unavailable(message: impl Into<String>) -> Self {
        Self::DatabaseUnavailable(message.into())
    }

    const fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::DatabaseUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    const fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_failed",
            Self::DatabaseUnavailable(_) => "database_unavailable",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let code = self.code();
        let (message, details) = match self {
            Self::Validation { message, details } => (message, details),
            Self::DatabaseUnavailable(message) | Self::Internal(message) => (message, None),
        };

        let mut problem = ProblemDetails::new(status, code, message);
        if let Some(details) = details {
            problem = problem.with_details(details);
        }
        problem.into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal(error.to_string())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            // Connection-tier failures read as a degraded database, the
            // same verdict a missing pool gets.
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::DatabaseUnavailable(error.to_string())
            }
            sqlx::Error::Database(db_error) => {
                let sqlstate = db_error
                    .code()
                    .unwrap_or_else(|| std::borrow::Cow::Borrowed("unknown"));
                Self::Internal(format!("database error {sqlstate}: {}", db_error.message()))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONTENT_TYPE;
    use serde_json::Value;

    #[test]
    fn variants_pin_status_and_code() {
        let invalid = ApiError::missing_field("endpoint", "endpoint missing");
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(invalid.code(), "validation_failed");

        let degraded = ApiError::database_unavailable("no database");
        assert_eq!(degraded.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(degraded.code(), "database_unavailable");
    }

    #[tokio::test]
    async fn into_response_renders_problem_json_with_field_details() {
        let response = ApiError::missing_field("endpoint", "endpoint missing").into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );

        let bytes = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .expect("body to bytes");
        let json: Value = serde_json::from_slice(&bytes).expect("problem body parses");
        assert_eq!(json["code"], "validation_failed");
        assert_eq!(json["message"], "endpoint missing");
        assert_eq!(json["details"]["field"], "endpoint");
    }

    #[test]
    fn connection_tier_sqlx_errors_read_as_database_unavailable() {
        let timed_out = ApiError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(timed_out.status(), StatusCode::SERVICE_UNAVAILABLE);

        let io = ApiError::from(sqlx::Error::Io(std::io::Error::other("connection reset")));
        assert_eq!(io.status(), StatusCode::SERVICE_UNAVAILABLE);

        let missing = ApiError::from(sqlx::Error::RowNotFound);
        assert_eq!(missing.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(missing.code(), "internal_error");
    }

    #[test]
    fn anyhow_errors_become_internal() {
        let error = ApiError::from(anyhow::anyhow!("listing failed"));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
