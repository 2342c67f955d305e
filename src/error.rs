//! Error types shared by the acquisition pipeline.
//!
//! Failures are grouped by where they happen: bad caller input, the upstream
//! site, the packed-script unpacker, or manifest extraction. The HTTP layer
//! only ever shows callers [`ScrapeError::public_message`], never the raw
//! upstream detail.

use actix_web::http::StatusCode;

/// Errors raised while reversing the packer obfuscation
#[derive(Debug, thiserror::Error)]
pub enum UnpackError {
    #[error("packed script not found")]
    NotFound,

    #[error("invalid packed format")]
    InvalidFormat,

    #[error("packed payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },
}

/// Errors that can occur anywhere in the acquisition pipeline
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] reqwest::Error),

    #[error("chapter page failed validation after {attempts} attempts")]
    ValidationFailure { attempts: usize },

    #[error("unpack failed: {0}")]
    Unpack(#[from] UnpackError),

    #[error("no manifest strategy matched the unpacked script")]
    ExtractionFailure,

    #[error("parse failed: {0}")]
    Parse(String),

    #[error("host not allowed: {0}")]
    HostNotAllowed(String),
}

impl ScrapeError {
    /// HTTP status used when this error reaches the API boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScrapeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ScrapeError::HostNotAllowed(_) => StatusCode::FORBIDDEN,
            ScrapeError::UpstreamUnavailable(_) | ScrapeError::ValidationFailure { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ScrapeError::Unpack(_) | ScrapeError::ExtractionFailure | ScrapeError::Parse(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to return to API callers
    pub fn public_message(&self) -> String {
        match self {
            ScrapeError::InvalidInput(msg) => msg.clone(),
            ScrapeError::HostNotAllowed(_) => "Domain not allowed".to_string(),
            _ => "Failed to load".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ScrapeError::InvalidInput("bad id".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ScrapeError::HostNotAllowed("evil.example.com".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ScrapeError::ValidationFailure { attempts: 3 }.status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ScrapeError::from(UnpackError::InvalidFormat).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_public_message_hides_detail() {
        let err = ScrapeError::Unpack(UnpackError::PayloadTooLarge { len: 10, max: 5 });
        assert_eq!(err.public_message(), "Failed to load");
        assert!(!err.public_message().contains("10"));

        let err = ScrapeError::InvalidInput("Invalid manga ID".into());
        assert_eq!(err.public_message(), "Invalid manga ID");
    }
}
