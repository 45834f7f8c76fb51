use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;

/// Envelope shared by every JSON endpoint.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub meta: ResponseMeta,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    pub status: &'static str,
    pub status_code: u16,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl ResponseMeta {
    fn new(status: StatusCode, message: Option<String>) -> Self {
        Self {
            status: if status.is_success() { "success" } else { "error" },
            status_code: status.as_u16(),
            timestamp: Utc::now().to_rfc3339(),
            message,
            elapsed_ms: None,
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.meta.elapsed_ms = Some(elapsed.as_millis() as u64);
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.meta.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

pub fn success<T: Serialize>(data: T) -> ApiResponse<T> {
    ApiResponse {
        data: Some(data),
        meta: ResponseMeta::new(StatusCode::OK, None),
    }
}

pub fn error<T: Serialize>(status: StatusCode, message: String) -> ApiResponse<T> {
    ApiResponse {
        data: None,
        meta: ResponseMeta::new(status, Some(message)),
    }
}
