pub mod types;
pub mod sanitize;
pub mod quality;
pub mod aggregate;
pub mod report;
pub mod retry;
pub mod job;
pub mod store;
pub mod vision_ocr;
pub mod orchestrator;

pub use types::*;
pub use sanitize::*;
pub use quality::*;
pub use aggregate::*;
pub use report::*;
pub use retry::*;
pub use job::*;
pub use store::*;
pub use vision_ocr::*;
pub use orchestrator::*;

use thiserror::Error;

/// Failure of a single call to a recovery collaborator (vision or full OCR).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecoveryError {
    #[error("Transient recovery failure: {0}")]
    Transient(String),

    #[error("Recovery service rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Recovery request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Recovery rejected the request: {0}")]
    Permanent(String),

    #[error("Recovery service unavailable: {0}")]
    Configuration(String),
}

impl RecoveryError {
    /// Network, timeout and rate-limit failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RecoveryError::Transient(_) | RecoveryError::RateLimited { .. } | RecoveryError::Timeout(_)
        )
    }

    /// True when the collaborator itself cannot be reached or is not set up.
    pub fn is_configuration(&self) -> bool {
        matches!(self, RecoveryError::Configuration(_))
    }

    /// Classify an HTTP-style status returned by a recovery service.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => RecoveryError::RateLimited {
                retry_after_secs: None,
            },
            401 | 403 | 404 => RecoveryError::Configuration(format!("HTTP {status}: {message}")),
            408 | 500..=599 => RecoveryError::Transient(format!("HTTP {status}: {message}")),
            _ => RecoveryError::Permanent(format!("HTTP {status}: {message}")),
        }
    }
}

/// Errors raised while setting up extraction (never for partial page failures).
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_retryable() {
        assert!(RecoveryError::Transient("reset".into()).is_transient());
        assert!(RecoveryError::Timeout(30).is_transient());
        assert!(RecoveryError::RateLimited {
            retry_after_secs: Some(2)
        }
        .is_transient());
        assert!(!RecoveryError::Permanent("bad page".into()).is_transient());
        assert!(!RecoveryError::Configuration("down".into()).is_transient());
    }

    #[test]
    fn status_codes_map_to_taxonomy() {
        assert_eq!(
            RecoveryError::from_status(429, "slow down"),
            RecoveryError::RateLimited {
                retry_after_secs: None
            }
        );
        assert!(matches!(RecoveryError::from_status(503, "busy"), RecoveryError::Transient(_)));
        assert!(RecoveryError::from_status(401, "no key").is_configuration());
        assert!(matches!(
            RecoveryError::from_status(422, "malformed image"),
            RecoveryError::Permanent(_)
        ));
    }

    #[test]
    fn gateway_timeouts_are_transient_without_claimed_duration() {
        for status in [408, 504] {
            let err = RecoveryError::from_status(status, "upstream timed out");
            assert!(err.is_transient());
            assert_eq!(
                err,
                RecoveryError::Transient(format!("HTTP {status}: upstream timed out"))
            );
            assert!(!err.to_string().contains("0 seconds"));
        }
    }

    #[test]
    fn error_messages_carry_context() {
        let err = RecoveryError::from_status(500, "boom");
        assert!(err.to_string().contains("HTTP 500: boom"));
    }
}
