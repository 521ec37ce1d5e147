//! Transformation error taxonomy
//!
//! Every variant is contained at file granularity by the engine: a failing
//! stage degrades that file's result and never aborts sibling files.

/// Errors raised by transformation stages
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    /// Source could not be parsed; not recoverable for this file
    #[error("parse error in {path}: {message}")]
    Parse {
        /// File path
        path: String,
        /// Location and reason
        message: String,
    },

    /// A stage failed for a reason of its own
    #[error("{stage} stage failed: {message}")]
    Stage {
        /// Stage name
        stage: &'static str,
        /// Reason
        message: String,
    },

    /// Semantic engine call failed
    #[error("semantic engine error: {message}")]
    Semantic {
        /// Reason
        message: String,
        /// Worth retrying
        retryable: bool,
        /// Upstream rate limit was hit
        rate_limited: bool,
        /// Server-provided delay before the next attempt
        retry_after_ms: Option<u64>,
    },

    /// Rule validation could not run
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// File is not JavaScript or TypeScript
    #[error("unsupported language for {0}")]
    UnsupportedLanguage(String),
}

impl TransformError {
    /// Semantic error that is retryable by default
    #[must_use]
    pub fn semantic(message: impl Into<String>) -> Self {
        TransformError::Semantic {
            message: message.into(),
            retryable: true,
            rate_limited: false,
            retry_after_ms: None,
        }
    }

    /// Rate-limited semantic error with an optional delay hint
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, retry_after_ms: Option<u64>) -> Self {
        TransformError::Semantic {
            message: message.into(),
            retryable: true,
            rate_limited: true,
            retry_after_ms,
        }
    }

    /// Semantic error that must not be retried
    #[must_use]
    pub fn semantic_fatal(message: impl Into<String>) -> Self {
        TransformError::Semantic {
            message: message.into(),
            retryable: false,
            rate_limited: false,
            retry_after_ms: None,
        }
    }

    /// Whether retrying the same call may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransformError::Semantic { retryable: true, .. })
    }

    /// Whether a recovery strategy may produce a usable result
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            TransformError::Parse { .. } | TransformError::UnsupportedLanguage(_)
        )
    }

    /// Delay hint attached to the error
    #[inline]
    #[must_use]
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            TransformError::Semantic { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}

/// Errors raised by a rule validator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Rule pattern is not a valid regular expression
    #[error("rule '{rule_id}' has an invalid pattern: {message}")]
    InvalidPattern {
        /// Rule id
        rule_id: String,
        /// Compiler message
        message: String,
    },

    /// Validator backend failed
    #[error("validator unavailable: {0}")]
    Unavailable(String),
}
