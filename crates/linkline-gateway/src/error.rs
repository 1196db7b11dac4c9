//! Error types for the gateway core

use thiserror::Error;

/// Result type alias using GatewayError
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Typed failures raised by the core components.
///
/// The chat orchestrator is the only place that turns these into a
/// user-facing result; ingestion and search hand them to the caller.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl GatewayError {
    /// Whether the upstream throttled the call.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::Http(e) => e.status().map(|s| s.as_u16() == 429).unwrap_or(false),
            _ => false,
        }
    }

    /// Map an unsuccessful upstream HTTP status to the matching variant.
    pub fn from_status(service: &str, status: reqwest::StatusCode, body: &str) -> Self {
        if status.as_u16() == 429 {
            Self::RateLimited(format!("{} returned 429: {}", service, body))
        } else {
            Self::Backend(format!("{} returned {}: {}", service, status, body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_classification() {
        assert!(GatewayError::RateLimited("slow down".into()).is_rate_limit());
        assert!(!GatewayError::Backend("boom".into()).is_rate_limit());
        assert!(!GatewayError::Validation("empty".into()).is_rate_limit());
    }

    #[test]
    fn test_from_status_maps_429() {
        let err = GatewayError::from_status("llm", reqwest::StatusCode::TOO_MANY_REQUESTS, "busy");
        assert!(err.is_rate_limit());

        let err = GatewayError::from_status("llm", reqwest::StatusCode::BAD_GATEWAY, "down");
        assert!(matches!(err, GatewayError::Backend(_)));
        assert!(err.to_string().contains("502"));
    }
}
