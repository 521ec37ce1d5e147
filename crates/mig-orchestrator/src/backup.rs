//! Per-job backup snapshots and restore
//!
//! A snapshot maps every fetched path to its pre-transform content. It is
//! taken once, before the first transform of a job, and is consumed by a
//! restore: after [`BackupManager::restore`] the snapshot is gone even when
//! some paths failed to restore.

use crate::error::BackupError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use indexmap::IndexMap;
use mig_core::RepositoryFile;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Captured pre-transform contents of one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    /// Owning job
    pub job_id: String,
    /// Capture time
    pub created_at: DateTime<Utc>,
    /// Path -> content
    pub files: IndexMap<String, String>,
}

/// Per-path restore failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreFailure {
    /// Path
    pub path: String,
    /// Reason
    pub message: String,
}

/// Outcome of a restore
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Paths written back
    pub restored: Vec<String>,
    /// Paths that could not be written
    pub errors: Vec<RestoreFailure>,
}

impl RestoreReport {
    /// Every path was restored
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Destination of restored content
#[async_trait]
pub trait RestoreTarget: Send + Sync {
    /// Write `content` back to `path`
    ///
    /// # Errors
    /// Any failure to write the path
    async fn restore(&self, path: &str, content: &str) -> Result<(), BackupError>;
}

/// Keeps restored files in memory
#[derive(Debug, Default)]
pub struct InMemoryRestoreTarget {
    files: DashMap<String, String>,
}

impl InMemoryRestoreTarget {
    /// Empty target
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restored content of `path`
    #[must_use]
    pub fn get(&self, path: &str) -> Option<String> {
        self.files.get(path).map(|v| v.value().clone())
    }

    /// Number of restored files
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Nothing restored yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl RestoreTarget for InMemoryRestoreTarget {
    async fn restore(&self, path: &str, content: &str) -> Result<(), BackupError> {
        self.files.insert(path.to_string(), content.to_string());
        Ok(())
    }
}

/// Writes restored files under a root directory
#[derive(Debug, Clone)]
pub struct DirectoryRestoreTarget {
    root: PathBuf,
}

impl DirectoryRestoreTarget {
    /// Target rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BackupError> {
        let rel = Path::new(path);
        let safe = !path.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if safe {
            Ok(self.root.join(rel))
        } else {
            Err(BackupError::InvalidPath {
                path: path.to_string(),
                message: "path escapes the restore root".to_string(),
            })
        }
    }
}

#[async_trait]
impl RestoreTarget for DirectoryRestoreTarget {
    async fn restore(&self, path: &str, content: &str) -> Result<(), BackupError> {
        let dest = self.resolve(path)?;
        let io_err = |e: std::io::Error| BackupError::InvalidPath {
            path: path.to_string(),
            message: e.to_string(),
        };
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&dest, content).await.map_err(io_err)
    }
}

/// Snapshot store keyed by job id
#[derive(Debug, Default)]
pub struct BackupManager {
    snapshots: DashMap<String, BackupSnapshot>,
}

impl BackupManager {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture `files` for `job_id`
    ///
    /// # Errors
    /// `BackupError::AlreadyExists` when the job already has a snapshot
    pub fn create_backup(&self, job_id: &str, files: &[RepositoryFile]) -> Result<usize, BackupError> {
        use dashmap::mapref::entry::Entry;
        match self.snapshots.entry(job_id.to_string()) {
            Entry::Occupied(_) => Err(BackupError::AlreadyExists(job_id.to_string())),
            Entry::Vacant(slot) => {
                let files: IndexMap<String, String> = files
                    .iter()
                    .map(|f| (f.path.clone(), f.content.clone()))
                    .collect();
                let count = files.len();
                slot.insert(BackupSnapshot {
                    job_id: job_id.to_string(),
                    created_at: Utc::now(),
                    files,
                });
                tracing::info!(job_id, files = count, "backup created");
                Ok(count)
            }
        }
    }

    /// Whether `job_id` has a snapshot
    #[must_use]
    pub fn has_backup(&self, job_id: &str) -> bool {
        self.snapshots.contains_key(job_id)
    }

    /// Copy of the snapshot
    #[must_use]
    pub fn snapshot(&self, job_id: &str) -> Option<BackupSnapshot> {
        self.snapshots.get(job_id).map(|s| s.value().clone())
    }

    /// Drop the snapshot; returns whether one existed
    pub fn cleanup(&self, job_id: &str) -> bool {
        let removed = self.snapshots.remove(job_id).is_some();
        if removed {
            tracing::debug!(job_id, "backup discarded");
        }
        removed
    }

    /// Consume the snapshot and write every file to `target`
    ///
    /// # Errors
    /// `BackupError::Missing` when there is no snapshot
    pub async fn restore(
        &self,
        job_id: &str,
        target: &dyn RestoreTarget,
    ) -> Result<RestoreReport, BackupError> {
        let (_, snapshot) = self
            .snapshots
            .remove(job_id)
            .ok_or_else(|| BackupError::Missing(job_id.to_string()))?;

        let mut report = RestoreReport::default();
        for (path, content) in &snapshot.files {
            match target.restore(path, content).await {
                Ok(()) => report.restored.push(path.clone()),
                Err(e) => {
                    tracing::warn!(job_id, path = %path, error = %e, "restore failed");
                    report.errors.push(RestoreFailure {
                        path: path.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }
        tracing::info!(
            job_id,
            restored = report.restored.len(),
            failed = report.errors.len(),
            "backup restored"
        );
        Ok(report)
    }

    /// Number of snapshots held
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// No snapshots held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
