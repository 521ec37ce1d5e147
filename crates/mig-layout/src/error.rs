//! Structure planning errors

/// Errors raised while planning a single file
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// Path is absolute or escapes the repository root
    #[error("invalid repository path: {0}")]
    InvalidPath(String),
}
