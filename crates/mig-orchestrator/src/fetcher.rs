//! Repository fetcher contract and the local-directory implementation

use crate::error::FetchError;
use crate::job::RepositoryRef;
use async_trait::async_trait;
use mig_core::RepositoryFile;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Fetch progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchProgress {
    /// Files fetched so far
    pub fetched: usize,
    /// Files to fetch
    pub total: usize,
    /// File just fetched
    pub current: Option<String>,
}

/// Fetch progress callback
pub type FetchProgressFn<'a> = &'a (dyn Fn(FetchProgress) + Send + Sync);

/// Source of repository files
#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    /// Fetch every source file of `repository`
    ///
    /// # Errors
    /// [`FetchError`] for upstream, lookup or I/O failures
    async fn fetch_all_source_files(
        &self,
        repository: &RepositoryRef,
        on_progress: FetchProgressFn<'_>,
    ) -> Result<Vec<RepositoryFile>, FetchError>;
}

/// Directories never worth migrating
const SKIP_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".next",
    "dist",
    "build",
    "out",
    "coverage",
    ".turbo",
    ".cache",
];

/// Reads a checked-out repository from disk
#[derive(Debug, Clone)]
pub struct LocalRepositoryFetcher {
    root: PathBuf,
    max_file_bytes: u64,
}

impl LocalRepositoryFetcher {
    /// Fetcher over `root`; files above 1 MiB are skipped
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_file_bytes: 1024 * 1024,
        }
    }

    /// Override the size limit
    #[must_use]
    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIP_DIRS.contains(&name))
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

/// Paths of candidate files, sorted
fn collect_paths(root: &Path, max_bytes: u64) -> Result<Vec<(String, PathBuf)>, FetchError> {
    if !root.is_dir() {
        return Err(FetchError::NotFound(root.display().to_string()));
    }
    let mut paths = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
    {
        let entry = entry.map_err(|e| FetchError::Io {
            path: e
                .path()
                .map_or_else(|| root.display().to_string(), |p| p.display().to_string()),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let size = entry.metadata().map(|m| m.len()).unwrap_or(u64::MAX);
        if size > max_bytes {
            tracing::debug!(path = %entry.path().display(), size, "skipping oversized file");
            continue;
        }
        if let Some(rel) = relative_path(root, entry.path()) {
            paths.push((rel, entry.into_path()));
        }
    }
    Ok(paths)
}

/// Read a text file; `None` for binary content
fn read_text(path: &Path) -> Result<Option<String>, FetchError> {
    let bytes = std::fs::read(path).map_err(|e| FetchError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    if bytes.contains(&0) {
        return Ok(None);
    }
    Ok(String::from_utf8(bytes).ok())
}

#[async_trait]
impl RepositoryFetcher for LocalRepositoryFetcher {
    async fn fetch_all_source_files(
        &self,
        repository: &RepositoryRef,
        on_progress: FetchProgressFn<'_>,
    ) -> Result<Vec<RepositoryFile>, FetchError> {
        let root = self.root.clone();
        let max = self.max_file_bytes;
        let paths = tokio::task::spawn_blocking(move || collect_paths(&root, max))
            .await
            .map_err(|e| FetchError::Io {
                path: self.root.display().to_string(),
                message: e.to_string(),
            })??;

        let total = paths.len();
        let mut files = Vec::with_capacity(total);
        for (idx, (rel, abs)) in paths.into_iter().enumerate() {
            let content = tokio::task::spawn_blocking(move || read_text(&abs))
                .await
                .map_err(|e| FetchError::Io {
                    path: rel.clone(),
                    message: e.to_string(),
                })??;
            on_progress(FetchProgress {
                fetched: idx + 1,
                total,
                current: Some(rel.clone()),
            });
            let Some(content) = content else {
                tracing::debug!(path = %rel, "skipping binary file");
                continue;
            };
            let sha = hex::encode(Sha256::digest(content.as_bytes()));
            files.push(RepositoryFile::new(rel, content).with_sha(sha));
        }

        tracing::info!(
            repository = %repository.slug(),
            root = %self.root.display(),
            files = files.len(),
            "fetched local repository"
        );
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn walks_sources_and_skips_noise() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/components")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/react")).unwrap();
        std::fs::write(root.join("src/App.jsx"), "export default 1;").unwrap();
        std::fs::write(root.join("src/components/Nav.jsx"), "nav").unwrap();
        std::fs::write(root.join("node_modules/react/index.js"), "nope").unwrap();
        std::fs::write(root.join("logo.png"), [0x89, 0x50, 0x00, 0x47]).unwrap();
        std::fs::write(root.join("big.txt"), "x".repeat(64)).unwrap();

        let fetcher = LocalRepositoryFetcher::new(root).with_max_file_bytes(32);
        let seen = Mutex::new(0usize);
        let files = fetcher
            .fetch_all_source_files(&RepositoryRef::new("local", "app"), &|p| {
                *seen.lock() = p.fetched;
            })
            .await
            .unwrap();

        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/App.jsx", "src/components/Nav.jsx"]);
        assert_eq!(files[1].sha, hex::encode(Sha256::digest(b"nav")));
        assert_eq!(*seen.lock(), 3);
    }

    #[tokio::test]
    async fn missing_root_is_not_found() {
        let fetcher = LocalRepositoryFetcher::new("/definitely/not/here");
        let err = fetcher
            .fetch_all_source_files(&RepositoryRef::new("a", "b"), &|_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }
}
