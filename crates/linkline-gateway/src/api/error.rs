//! HTTP mapping of core failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::error::GatewayError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
    pub timestamp: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self { status, detail: detail.into() }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }
}

pub fn status_for(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::Validation(_) | GatewayError::UnsupportedType(_) => StatusCode::BAD_REQUEST,
        GatewayError::QuotaExceeded(_) | GatewayError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        GatewayError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        Self::new(status_for(&e), e.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request failed with {}: {}", self.status, self.detail);
        }
        let body = ErrorResponse {
            error: self
                .status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            detail: self.detail,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&GatewayError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&GatewayError::UnsupportedType("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&GatewayError::QuotaExceeded("x".into())), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_for(&GatewayError::RateLimited("x".into())), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_for(&GatewayError::Configuration("x".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(&GatewayError::Backend("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_into_response_status() {
        let response = ApiError::from(GatewayError::QuotaExceeded("Daily AI limit reached".into())).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
