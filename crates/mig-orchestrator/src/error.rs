//! Error types for the orchestrator
//!
//! - [`OrchestratorError`]: job control and execution failures
//! - [`FetchError`]: repository fetcher failures, including upstream API errors
//! - [`BackupError`]: snapshot creation and restore failures
//! - [`PublishError`]: pull-request publishing failures

use crate::job::JobStatus;
use mig_core::SpecError;

/// Orchestration error
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Unknown job id
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Requested state change is not allowed
    #[error("invalid job transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: JobStatus,
        /// Requested status
        to: JobStatus,
    },

    /// No credential supplied
    #[error("missing credential")]
    MissingCredential,

    /// Specification failed validation
    #[error("invalid specification: {0}")]
    InvalidSpecification(#[from] SpecError),

    /// Rollback requested without a snapshot
    #[error("no backup available for job {0}")]
    NoBackup(String),

    /// Fetching the repository failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Backup creation or restore failed
    #[error("backup error: {0}")]
    Backup(#[from] BackupError),

    /// Job was cancelled
    #[error("migration cancelled")]
    Cancelled,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Execution task died
    #[error("execution aborted: {0}")]
    Aborted(String),
}

impl OrchestratorError {
    /// Whether the error came from an upstream rate limit
    #[inline]
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, OrchestratorError::Fetch(e) if e.is_rate_limited())
    }
}

/// Repository fetch error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Upstream API returned an error status
    #[error("upstream returned {status}: {message}{}", retry_hint(.retry_after_secs))]
    Upstream {
        /// HTTP status
        status: u16,
        /// Upstream message
        message: String,
        /// Seconds until the rate limit resets
        retry_after_secs: Option<u64>,
    },

    /// Repository or ref does not exist
    #[error("repository not found: {0}")]
    NotFound(String),

    /// Local I/O failure
    #[error("i/o error at {path}: {message}")]
    Io {
        /// Path being read
        path: String,
        /// OS message
        message: String,
    },
}

#[allow(clippy::ref_option)]
fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    retry_after_secs.map_or_else(String::new, |s| format!(" (rate limited, retry after {s}s)"))
}

impl FetchError {
    /// 429, or 403 with a reset hint
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        match self {
            FetchError::Upstream {
                status,
                retry_after_secs,
                ..
            } => *status == 429 || (*status == 403 && retry_after_secs.is_some()),
            _ => false,
        }
    }

    /// Server-side or rate-limit failure
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Upstream { status, .. } => *status >= 500 || self.is_rate_limited(),
            _ => false,
        }
    }
}

/// Backup error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackupError {
    /// A snapshot already exists for the job
    #[error("backup already exists for job {0}")]
    AlreadyExists(String),

    /// No snapshot for the job
    #[error("no backup for job {0}")]
    Missing(String),

    /// Restore target refused a path
    #[error("cannot restore {path}: {message}")]
    InvalidPath {
        /// Offending path
        path: String,
        /// Reason
        message: String,
    },
}

/// Publishing error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// API call failed
    #[error("{operation} failed with {status}: {message}")]
    Api {
        /// Operation name
        operation: &'static str,
        /// HTTP status
        status: u16,
        /// Message
        message: String,
    },

    /// No changed files
    #[error("nothing to publish")]
    NothingToPublish,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_classification() {
        let limited = FetchError::Upstream {
            status: 403,
            message: "API rate limit exceeded".into(),
            retry_after_secs: Some(60),
        };
        assert!(limited.is_rate_limited());
        assert!(limited.is_retryable());
        assert_eq!(
            limited.to_string(),
            "upstream returned 403: API rate limit exceeded (rate limited, retry after 60s)"
        );

        let forbidden = FetchError::Upstream {
            status: 403,
            message: "forbidden".into(),
            retry_after_secs: None,
        };
        assert!(!forbidden.is_rate_limited());
        assert!(!forbidden.is_retryable());

        let server = FetchError::Upstream {
            status: 502,
            message: "bad gateway".into(),
            retry_after_secs: None,
        };
        assert!(server.is_retryable());

        let err: OrchestratorError = limited.into();
        assert!(err.is_rate_limited());
        assert!(err.to_string().starts_with("fetch failed: upstream returned 403"));
    }
}
