//! Migration jobs and their state machine
//!
//! ```text
//! pending -> running <-> paused
//! running -> completed | failed
//! paused  -> failed            (cancellation)
//! completed -> pending         (rollback)
//! ```

use crate::error::OrchestratorError;
use crate::summary::MigrationSummary;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use mig_core::{FileStructureChange, MigrationSpecification, TransformResult};
use mig_transform::TransformationStatistics;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created or rolled back, not running
    Pending,
    /// Executing
    Running,
    /// Waiting for resume
    Paused,
    /// Finished with a result
    Completed,
    /// Finished with an error (including cancellation)
    Failed,
}

impl JobStatus {
    /// Completed or failed
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Lower-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States reachable from `from`
#[must_use]
pub fn allowed_transitions(from: JobStatus) -> Vec<JobStatus> {
    use JobStatus::{Completed, Failed, Paused, Pending, Running};
    match from {
        Pending => vec![Running],
        Running => vec![Paused, Completed, Failed],
        Paused => vec![Running, Failed],
        Completed => vec![Pending],
        Failed => vec![],
    }
}

/// Check a status change
///
/// # Errors
/// `OrchestratorError::InvalidTransition` when `to` is not reachable from `from`
pub fn validate_transition(from: JobStatus, to: JobStatus) -> Result<(), OrchestratorError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidTransition { from, to })
    }
}

/// Repository being migrated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// Owner or organisation
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Branch, tag or commit
    #[serde(default)]
    pub git_ref: Option<String>,
}

impl RepositoryRef {
    /// Reference to the default branch
    #[must_use]
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            git_ref: None,
        }
    }

    /// `owner/repo[@ref]`
    #[must_use]
    pub fn slug(&self) -> String {
        match &self.git_ref {
            Some(r) => format!("{}/{}@{r}", self.owner, self.repo),
            None => format!("{}/{}", self.owner, self.repo),
        }
    }
}

/// Access token for the repository host
///
/// Never serialized and redacted in debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Whether the token is blank
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Per-request options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationOptions {
    /// Override the configured backup behaviour
    pub create_backups: Option<bool>,
    /// Compute results without taking a snapshot
    pub dry_run: bool,
    /// Ref to migrate; overrides the repository reference
    pub git_ref: Option<String>,
}

/// Start request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRequest {
    /// Repository
    pub repository: RepositoryRef,
    /// Specification
    pub spec: MigrationSpecification,
    /// Options
    #[serde(default)]
    pub options: MigrationOptions,
}

/// Progress snapshot of a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Files in the batch
    pub total_files: usize,
    /// Files finished
    pub processed_files: usize,
    /// Percent complete
    pub percentage: u8,
    /// File that finished last
    pub current_file: Option<String>,
    /// Estimated seconds remaining
    pub eta_seconds: Option<u64>,
}

/// Result of a completed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Per-file results in fetch order
    pub results: IndexMap<String, TransformResult>,
    /// Planned structure changes, ordered
    pub structure_changes: Vec<FileStructureChange>,
    /// Aggregates
    pub summary: MigrationSummary,
    /// Engine statistics
    pub statistics: TransformationStatistics,
    /// Run without a backup snapshot
    pub dry_run: bool,
}

/// A migration job
#[derive(Debug, Clone, Serialize)]
pub struct MigrationJob {
    /// Job id (ULID)
    pub id: String,
    /// Status
    pub status: JobStatus,
    /// Repository
    pub repository: RepositoryRef,
    /// Specification, immutable once attached
    pub spec: MigrationSpecification,
    /// Options
    pub options: MigrationOptions,
    /// Progress
    pub progress: JobProgress,
    /// Result once completed
    pub result: Option<MigrationResult>,
    /// Error once failed
    pub error: Option<String>,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Time the job reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub(crate) credential: Credential,
}

impl MigrationJob {
    pub(crate) fn new(id: String, request: MigrationRequest, credential: Credential) -> Self {
        let mut repository = request.repository;
        if let Some(git_ref) = &request.options.git_ref {
            repository.git_ref = Some(git_ref.clone());
        }
        Self {
            id,
            status: JobStatus::Running,
            repository,
            spec: request.spec,
            options: request.options,
            progress: JobProgress::default(),
            result: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            credential,
        }
    }

    /// Credential attached at start
    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Move to `to`, enforcing the state machine
    ///
    /// # Errors
    /// `OrchestratorError::InvalidTransition`
    pub fn transition(&mut self, to: JobStatus) -> Result<(), OrchestratorError> {
        validate_transition(self.status, to)?;
        tracing::debug!(job_id = %self.id, from = %self.status, %to, "job transition");
        self.status = to;
        if to.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}
