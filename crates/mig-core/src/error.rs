//! Error types for the shared data model

/// Structural problems in a [`crate::MigrationSpecification`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    /// Required field is empty
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Two rules share an id
    #[error("duplicate rule id: {0}")]
    DuplicateRule(String),

    /// A mapping table maps a key onto itself
    #[error("mapping maps '{0}' onto itself")]
    SelfMapping(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_error_display() {
        let err = SpecError::MissingField("source.framework");
        assert_eq!(err.to_string(), "missing required field: source.framework");
    }
}
