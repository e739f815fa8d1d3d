//! Error types for SmartRoute

use thiserror::Error;

/// Result type alias using SmartRoute's Error
pub type Result<T> = std::result::Result<T, Error>;

/// SmartRoute error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Request errors (E001-E099)
    #[error("Please choose either fallback or tier, not both.")]
    ConflictingSelection,

    #[error("Unknown model '{0}'. Run `smartroute models` to see all model keys.")]
    UnknownModel(String),

    #[error("Invalid tier '{0}'. Choose between 'fast', 'mid', or 'reasoning'.")]
    InvalidTier(String),

    // Dispatch errors (E100-E199)
    #[error("All models failed to process the request ({attempted} attempted).")]
    AllCandidatesFailed { attempted: usize },

    // Scoring errors (E200-E299)
    #[error("Complexity scoring failed: {0}")]
    ScoringFailed(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConflictingSelection => "E001",
            Self::UnknownModel(_) => "E002",
            Self::InvalidTier(_) => "E003",
            Self::AllCandidatesFailed { .. } => "E100",
            Self::ScoringFailed(_) => "E200",
            Self::ConfigError(_) => "E600",
            Self::Other(_) => "E9999",
        }
    }

    /// Whether the request itself was malformed.
    ///
    /// Caller errors are reported immediately and never retried.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::ConflictingSelection | Self::UnknownModel(_) | Self::InvalidTier(_)
        )
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::ConflictingSelection => {
                Some("Pass either --tier or --fallback, not both".to_string())
            }
            Self::UnknownModel(_) => Some("smartroute models".to_string()),
            Self::InvalidTier(_) => Some("Use one of: fast, mid, reasoning".to_string()),
            Self::AllCandidatesFailed { .. } => {
                Some("Retry later or pass --latency-mode to race the candidates".to_string())
            }
            Self::ConfigError(_) => Some("smartroute config path".to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_errors_are_classified() {
        assert!(Error::ConflictingSelection.is_caller_error());
        assert!(Error::UnknownModel("x".into()).is_caller_error());
        assert!(Error::InvalidTier("huge".into()).is_caller_error());
        assert!(!Error::AllCandidatesFailed { attempted: 3 }.is_caller_error());
        assert!(!Error::ScoringFailed("boom".into()).is_caller_error());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::ConflictingSelection.code(), "E001");
        assert_eq!(Error::AllCandidatesFailed { attempted: 0 }.code(), "E100");
        assert_eq!(Error::ConfigError("bad".into()).code(), "E600");
        assert_eq!(Error::ScoringFailed("nan".into()).code(), "E200");
        assert_eq!(Error::Other("admission gate closed".into()).code(), "E9999");
    }

    #[test]
    fn test_messages_name_the_offending_value() {
        let err = Error::UnknownModel("gpt-9".into());
        assert!(err.to_string().contains("gpt-9"));

        let err = Error::InvalidTier("huge".into());
        assert!(err.to_string().contains("'huge'"));
    }
}
