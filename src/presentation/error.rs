// API errors - Error types and their HTTP rendering
use crate::application::chart_presenter::PresenterError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Request validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Chart view could not be opened or rendered
    #[error("Chart error: {0}")]
    Chart(#[from] PresenterError),

    /// A background component is gone
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Chart(PresenterError::NotOpen) => (StatusCode::CONFLICT, "CHART_NOT_OPEN"),
            ApiError::Chart(PresenterError::UnknownView(_)) => (StatusCode::NOT_FOUND, "VIEW_NOT_FOUND"),
            ApiError::Chart(PresenterError::RendererUnavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "RENDERER_UNAVAILABLE")
            }
            ApiError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        };

        if status.is_server_error() {
            tracing::warn!("Request failed: {}", self);
        }

        let body = ErrorBody {
            code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let response = ApiError::Validation("bad window".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::from(PresenterError::RendererUnavailable("gone".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = ApiError::from(PresenterError::UnknownView(4)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
