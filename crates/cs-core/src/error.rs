//! Error types for cs-core

use std::time::Duration;

use thiserror::Error;

/// Failure of a single completion request.
///
/// The chat service does not retry any of these; it only decides whether the
/// failure reaches the caller or is replaced by the fallback reply.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("rate limited or quota exceeded: {0}")]
    RateLimited(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("completion timed out after {0:?}")]
    Timeout(Duration),

    #[error("completion returned an empty reply")]
    EmptyReply,

    #[error("no API key configured")]
    MissingApiKey,
}

impl GatewayError {
    /// Stable, machine-readable name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Auth(_) => "auth",
            Self::RateLimited(_) => "rate_limited",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Upstream { .. } => "upstream",
            Self::Timeout(_) => "timeout",
            Self::EmptyReply => "empty_reply",
            Self::MissingApiKey => "missing_api_key",
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Main error type for cs-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Completion gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for cs-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_kinds() {
        assert_eq!(GatewayError::Auth("bad key".into()).kind(), "auth");
        assert_eq!(GatewayError::RateLimited("slow down".into()).kind(), "rate_limited");
        assert_eq!(GatewayError::Timeout(Duration::from_secs(1)).kind(), "timeout");
        assert_eq!(
            GatewayError::Upstream { status: 500, body: String::new() }.kind(),
            "upstream"
        );
        assert_eq!(GatewayError::EmptyReply.kind(), "empty_reply");
    }

    #[test]
    fn test_gateway_error_wraps_into_core_error() {
        let err: Error = GatewayError::MissingApiKey.into();
        assert!(matches!(err, Error::Gateway(GatewayError::MissingApiKey)));
        assert!(err.to_string().contains("no API key configured"));
    }
}
