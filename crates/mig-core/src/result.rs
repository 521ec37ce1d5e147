//! Per-file transformation results and repository files

use crate::layout::{FileStructureChange, FileType};
use serde::{Deserialize, Serialize};

/// Confidence below which a result always requires review
pub const DEFAULT_REVIEW_THRESHOLD: u8 = 70;

/// Kind of repository entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file
    #[default]
    File,
    /// Symbolic link (content is the link target)
    Symlink,
}

/// A file fetched from the repository being migrated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryFile {
    /// Repository-relative path with `/` separators
    pub path: String,
    /// UTF-8 content
    pub content: String,
    /// Content hash reported by the fetcher
    pub sha: String,
    /// Size in bytes
    pub size: u64,
    /// Entry kind
    #[serde(default, rename = "type")]
    pub kind: EntryKind,
}

impl RepositoryFile {
    /// Create a regular file entry; `sha` is left empty for the caller to fill
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            size: content.len() as u64,
            content,
            sha: String::new(),
            kind: EntryKind::File,
        }
    }

    /// With content hash
    #[inline]
    #[must_use]
    pub fn with_sha(mut self, sha: impl Into<String>) -> Self {
        self.sha = sha.into();
        self
    }

    /// Lower-cased file extension, if any
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        let name = self.path.rsplit('/').next().unwrap_or(&self.path);
        name.rsplit_once('.')
            .filter(|(stem, _)| !stem.is_empty())
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    /// Whether the file is JS/TS source the content stages understand
    #[must_use]
    pub fn is_script(&self) -> bool {
        matches!(
            self.extension().as_deref(),
            Some("js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs")
        )
    }

    /// Line count of the content
    #[inline]
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }
}

/// Metadata attached to a transform result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformMetadata {
    /// Role of the file in the target layout
    pub file_type: FileType,
    /// Module specifiers introduced by the transformation
    pub dependencies_added: Vec<String>,
    /// Module specifiers no longer imported
    pub dependencies_removed: Vec<String>,
    /// Free-form notes (stage rationale, applied rewrites)
    pub notes: Vec<String>,
    /// Planned relocation, if any
    pub structure_change: Option<FileStructureChange>,
}

impl TransformMetadata {
    /// Empty metadata for a file type
    #[inline]
    #[must_use]
    pub fn new(file_type: FileType) -> Self {
        Self {
            file_type,
            dependencies_added: Vec::new(),
            dependencies_removed: Vec::new(),
            notes: Vec::new(),
            structure_change: None,
        }
    }
}

/// Outcome of transforming one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformResult {
    /// Final code
    pub code: String,
    /// Path after migration (equal to the original path when not relocated)
    pub new_path: String,
    /// Unified diff between original and final code (empty when unchanged)
    pub diff: String,
    /// Confidence in `[0, 100]`
    pub confidence: u8,
    /// Whether a human should review this file
    pub requires_review: bool,
    /// Ordered warnings
    pub warnings: Vec<String>,
    /// Metadata
    pub metadata: TransformMetadata,
}

impl TransformResult {
    /// Degraded result for a file whose pipeline failed
    ///
    /// Keeps the original code, zero confidence, review required.
    #[must_use]
    pub fn failed(file: &RepositoryFile, file_type: FileType, message: impl Into<String>) -> Self {
        Self {
            code: file.content.clone(),
            new_path: file.path.clone(),
            diff: String::new(),
            confidence: 0,
            requires_review: true,
            warnings: vec![message.into()],
            metadata: TransformMetadata::new(file_type),
        }
    }

    /// Whether the code differs from the input
    #[inline]
    #[must_use]
    pub fn is_changed(&self) -> bool {
        !self.diff.is_empty()
    }

    /// Whether confidence clears a threshold
    #[inline]
    #[must_use]
    pub fn is_confident(&self, threshold: u8) -> bool {
        self.confidence >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_detection() {
        assert_eq!(RepositoryFile::new("src/App.tsx", "").extension().as_deref(), Some("tsx"));
        assert_eq!(RepositoryFile::new("Makefile", "").extension(), None);
        assert_eq!(RepositoryFile::new(".eslintrc", "").extension(), None);
        assert!(RepositoryFile::new("a/b.MJS", "").is_script());
        assert!(!RepositoryFile::new("a/b.css", "").is_script());
    }

    #[test]
    fn failed_result_keeps_original() {
        let file = RepositoryFile::new("src/a.js", "let a = 1;\n");
        let result = TransformResult::failed(&file, FileType::Other, "boom");
        assert_eq!(result.code, file.content);
        assert_eq!(result.confidence, 0);
        assert!(result.requires_review);
        assert_eq!(result.warnings, vec!["boom".to_string()]);
        assert!(!result.is_changed());
    }

    #[test]
    fn size_tracks_content() {
        let file = RepositoryFile::new("a.js", "abc").with_sha("deadbeef");
        assert_eq!(file.size, 3);
        assert_eq!(file.sha, "deadbeef");
        assert_eq!(file.line_count(), 1);
    }
}
