//! Error types for gavel-core.

use thiserror::Error;

/// Result type alias using gavel-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Severity attached to an error for reporting purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSeverity {
    /// Process cannot continue (boot-time configuration failures).
    Fatal,
    /// Operation failed but the engine degraded gracefully.
    Recoverable,
    /// Informational degradation folded into the result.
    Advisory,
}

/// Errors that can occur during audit orchestration.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration violated an invariant or an option was out of range
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// Prompt template missing a required section or variable
    #[error("Template error: {0}")]
    Template(String),

    /// External reviewer process not reachable
    #[error("Judge unavailable: {0}")]
    JudgeUnavailable(String),

    /// Judge exceeded the audit timeout
    #[error("Judge timed out after {duration_ms}ms")]
    JudgeTimeout { duration_ms: u64 },

    /// Judge returned a malformed structured response
    #[error("Judge protocol error: {message}")]
    JudgeProtocol {
        message: String,
        /// Raw payload kept as evidence for the synthetic review.
        raw: Option<String>,
    },

    /// A concurrent audit is already in flight for this session
    #[error("Session {0} is busy with another audit")]
    SessionBusy(String),

    /// Memory or file-descriptor watermark critical after cleanup
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Code present but its language hint could not be parsed
    #[error("Invalid code format: {0}")]
    InvalidCodeFormat(String),

    /// Session persistence error
    #[error("Session storage error: {0}")]
    SessionStorage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a judge protocol error carrying the raw payload.
    pub fn judge_protocol(message: impl Into<String>, raw: Option<String>) -> Self {
        Self::JudgeProtocol {
            message: message.into(),
            raw,
        }
    }

    /// Create a judge timeout error.
    pub fn judge_timeout(duration_ms: u64) -> Self {
        Self::JudgeTimeout { duration_ms }
    }

    /// Severity of this error for reporting.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ConfigurationInvalid(_) => ErrorSeverity::Fatal,
            Self::Template(_)
            | Self::JudgeUnavailable(_)
            | Self::JudgeTimeout { .. }
            | Self::JudgeProtocol { .. }
            | Self::ResourceExhausted(_)
            | Self::SessionStorage(_)
            | Self::Serialization(_)
            | Self::Internal(_) => ErrorSeverity::Recoverable,
            Self::SessionBusy(_) | Self::InvalidCodeFormat(_) => ErrorSeverity::Advisory,
        }
    }

    /// Whether the caller may retry the operation as-is.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::SessionBusy(_) | Self::JudgeTimeout { .. } | Self::ResourceExhausted(_)
        )
    }

    /// Operator-facing hint for resolving the error.
    pub fn suggested_fix(&self) -> &'static str {
        match self {
            Self::ConfigurationInvalid(_) => {
                "Fix the configuration file; tier scores must be descending and loop floors ascending"
            }
            Self::Template(_) => {
                "Restore the required sections and variables in the prompt template"
            }
            Self::JudgeUnavailable(_) => {
                "Verify the judge command is installed and on PATH, or the endpoint is reachable"
            }
            Self::JudgeTimeout { .. } => "Raise audit.timeout_ms or reduce the code payload",
            Self::JudgeProtocol { .. } => {
                "Inspect the raw payload; the judge must emit a single JSON review object"
            }
            Self::SessionBusy(_) => "Wait for the in-flight audit on this session to finish",
            Self::ResourceExhausted(_) => "Lower concurrency or raise the configured budgets",
            Self::InvalidCodeFormat(_) => "Label fenced code blocks with a known language",
            Self::SessionStorage(_) => "Check the session state directory is writable",
            Self::Serialization(_) => "Report the malformed payload upstream",
            Self::Internal(_) => "Report this as a bug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_classification() {
        assert_eq!(
            Error::ConfigurationInvalid("bad".into()).severity(),
            ErrorSeverity::Fatal
        );
        assert_eq!(
            Error::SessionBusy("s-1".into()).severity(),
            ErrorSeverity::Advisory
        );
        assert_eq!(
            Error::judge_timeout(30_000).severity(),
            ErrorSeverity::Recoverable
        );
    }

    #[test]
    fn test_retryable() {
        assert!(Error::SessionBusy("s-1".into()).retryable());
        assert!(!Error::JudgeUnavailable("not found".into()).retryable());
        assert!(!Error::Template("missing section".into()).retryable());
    }

    #[test]
    fn test_protocol_error_keeps_raw_payload() {
        let err = Error::judge_protocol("score out of range", Some("{\"overall\":240}".into()));
        match err {
            Error::JudgeProtocol { raw, .. } => {
                assert_eq!(raw.as_deref(), Some("{\"overall\":240}"));
            }
            other => panic!("unexpected variant: {other}"),
        }
    }
}
