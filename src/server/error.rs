use axum::http::StatusCode;
use axum::response::{IntoResponse, Response, Json};

/// HTTP-facing error type; renders as `{"detail": message}`.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    BadGateway(String),
    Internal(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::BadRequest(m) => write!(f, "Bad request: {}", m),
            AppError::BadGateway(m) => write!(f, "Bad gateway: {}", m),
            AppError::Internal(m) => write!(f, "Internal error: {}", m),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            AppError::BadGateway(m) => (StatusCode::BAD_GATEWAY, m),
            AppError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(serde_json::json!({"detail": message}))).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            AppError::BadGateway(format!("Backend unreachable: {}", e))
        } else {
            AppError::Internal(format!("Backend request failed: {}", e))
        }
    }
}
