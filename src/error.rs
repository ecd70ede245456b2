//! Error types for the intelligence engine

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the intelligence engine
#[derive(Error, Debug)]
pub enum Error {
    // Input validation errors
    #[error("Invalid {chain} address: {address}")]
    InvalidAddress { chain: String, address: String },

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("Expected between {min} and {max} tokens, got {got}")]
    InvalidTokenCount { min: usize, max: usize, got: usize },

    #[error("Token requested more than once: {0}")]
    DuplicateToken(String),

    #[error("Invalid token spec '{0}', expected <chain>:<address>")]
    InvalidTokenSpec(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Upstream errors
    #[error("Upstream {upstream} request failed: {message}")]
    Upstream { upstream: String, message: String },

    #[error("Upstream {upstream} returned HTTP {status}")]
    UpstreamStatus { upstream: String, status: u16 },

    #[error("Upstream {0} rate limited the request")]
    RateLimited(String),

    #[error("Upstream {upstream} rejected the request: {message}")]
    UpstreamRejected { upstream: String, message: String },

    #[error("No provider registered for chain {0}")]
    ProviderMissing(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Upstream { .. } | Error::RateLimited(_) => true,
            Error::UpstreamStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Check if this error rejects caller input before any upstream work
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidAddress { .. }
                | Error::UnsupportedChain(_)
                | Error::InvalidTokenCount { .. }
                | Error::DuplicateToken(_)
                | Error::InvalidTokenSpec(_)
        )
    }

    pub(crate) fn upstream(upstream: &str, err: impl std::fmt::Display) -> Self {
        Error::Upstream {
            upstream: upstream.to_string(),
            message: err.to_string(),
        }
    }

    /// An error body that retrying will not change (bad key, bad params)
    pub(crate) fn rejected(upstream: &str, err: impl std::fmt::Display) -> Self {
        Error::UpstreamRejected {
            upstream: upstream.to_string(),
            message: err.to_string(),
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let throttled = Error::UpstreamStatus {
            upstream: "helius".into(),
            status: 429,
        };
        let server = Error::UpstreamStatus {
            upstream: "helius".into(),
            status: 503,
        };
        let not_found = Error::UpstreamStatus {
            upstream: "helius".into(),
            status: 404,
        };

        assert!(throttled.is_retryable());
        assert!(server.is_retryable());
        assert!(!not_found.is_retryable());
        assert!(!Error::UnsupportedChain("tron".into()).is_retryable());
        assert!(!Error::rejected("etherscan", "Invalid API Key").is_retryable());
    }

    #[test]
    fn test_validation_errors() {
        assert!(Error::InvalidTokenCount { min: 2, max: 10, got: 1 }.is_validation());
        assert!(Error::DuplicateToken("solana:abc".into()).is_validation());
        assert!(!Error::upstream("etherscan", "connection reset").is_validation());
    }
}
