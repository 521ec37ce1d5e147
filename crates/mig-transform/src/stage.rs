//! Transformation stage abstraction
//!
//! The engine runs an ordered list of stages over each script file. Each
//! stage receives the previous stage's code and returns new code plus
//! signals that feed confidence, warnings and metadata.

use crate::error::TransformError;
use async_trait::async_trait;
use mig_core::{FileType, MigrationSpecification, RepositoryFile};

/// Per-file context shared by every stage
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    /// File being transformed (original content)
    pub file: &'a RepositoryFile,
    /// Specification
    pub spec: &'a MigrationSpecification,
    /// Classified file type
    pub file_type: FileType,
    /// Path the file will have after migration
    pub new_path: &'a str,
}

/// Signals a stage reports alongside its code
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageSignals {
    /// Confidence reported by the stage; the last reported value is the base
    pub confidence: Option<u8>,
    /// Non-fatal syntax-level problems
    pub errors: Vec<String>,
    /// Warnings
    pub warnings: Vec<String>,
    /// Stage asks for human review
    pub requires_review: bool,
    /// Notes for the result metadata
    pub notes: Vec<String>,
    /// Module specifiers introduced
    pub dependencies_added: Vec<String>,
    /// Module specifiers dropped
    pub dependencies_removed: Vec<String>,
}

impl StageSignals {
    /// Fold another stage's signals into this accumulator
    pub fn merge(&mut self, other: StageSignals) {
        if other.confidence.is_some() {
            self.confidence = other.confidence;
        }
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.requires_review |= other.requires_review;
        self.notes.extend(other.notes);
        for dep in other.dependencies_added {
            if !self.dependencies_added.contains(&dep) {
                self.dependencies_added.push(dep);
            }
        }
        for dep in other.dependencies_removed {
            if !self.dependencies_removed.contains(&dep) {
                self.dependencies_removed.push(dep);
            }
        }
    }
}

/// Code plus signals produced by one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutput {
    /// Rewritten code
    pub code: String,
    /// Signals
    pub signals: StageSignals,
}

impl StageOutput {
    /// Output with no signals
    #[inline]
    #[must_use]
    pub fn unchanged(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            signals: StageSignals::default(),
        }
    }
}

/// One step of the per-file pipeline
///
/// Returning `Err` fails the whole file: later stages do not run and the
/// file's result degrades to confidence 0.
#[async_trait]
pub trait TransformStage: Send + Sync {
    /// Stage name for logs and warnings
    fn name(&self) -> &'static str;

    /// Transform `code`
    async fn apply(&self, code: &str, ctx: &StageContext<'_>)
        -> Result<StageOutput, TransformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_last_confidence_and_dedups() {
        let mut acc = StageSignals {
            dependencies_added: vec!["next".into()],
            ..StageSignals::default()
        };
        acc.merge(StageSignals {
            confidence: Some(80),
            errors: vec!["e".into()],
            dependencies_added: vec!["next".into(), "swr".into()],
            ..StageSignals::default()
        });
        acc.merge(StageSignals {
            requires_review: true,
            ..StageSignals::default()
        });
        assert_eq!(acc.confidence, Some(80));
        assert!(acc.requires_review);
        assert_eq!(acc.dependencies_added, vec!["next".to_string(), "swr".to_string()]);
        assert_eq!(acc.errors.len(), 1);
    }
}
