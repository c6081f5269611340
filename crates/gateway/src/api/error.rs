//! The error envelope every endpoint returns on failure:
//! `{ "error", "message", "timestamp", "path"? }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;

use rl_domain::error::Error;

pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
    path: Option<String>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "invalid_request",
            message: message.into(),
            path: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: "not_found",
            message: message.into(),
            path: None,
        }
    }

    pub fn busy(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            error: "conversation_busy",
            message: message.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Map a domain error to its HTTP shape: 404 for unknowns, 400 for
    /// caller mistakes, 502 for the LLM upstream, 503 for the vector
    /// store, 500 for the rest.
    pub fn from_domain(e: &Error) -> Self {
        let (status, error) = match e {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Error::Provider { .. } | Error::Timeout(_) => (StatusCode::BAD_GATEWAY, "provider_error"),
            Error::VectorStore(_) => (StatusCode::SERVICE_UNAVAILABLE, "vector_store_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        Self {
            status,
            error,
            message: e.to_string(),
            path: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "error": self.error,
            "message": self.message,
            "timestamp": Utc::now(),
        });
        if let Some(path) = self.path {
            body["path"] = serde_json::Value::String(path);
        }
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_mapping_covers_the_status_table() {
        let cases = [
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (
                Error::Provider {
                    provider: "qwen".into(),
                    message: "boom".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (Error::VectorStore("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (Error::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from_domain(&error).status, status);
        }
    }
}
