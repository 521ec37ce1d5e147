//! MIG Orchestrator - migration jobs end to end
//!
//! - [`orchestrator`] runs jobs: fetch, backup, batch transform, summary
//! - [`job`] holds the job state machine and request types
//! - [`backup`] snapshots repositories and restores them on rollback
//! - [`progress`] fans events out to callbacks and streams
//! - [`fetcher`] abstracts the repository source
//! - [`publish`] commits results and opens pull requests
//! - [`config`] layered TOML and environment configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use mig_orchestrator::prelude::*;
//!
//! let orchestrator = MigrationOrchestrator::builder(Arc::new(LocalRepositoryFetcher::new("./app")))
//!     .config(MigratorConfig::from_env_and_file(None)?)
//!     .build();
//! let job = orchestrator.start_migration(request, Some(Credential::new(token)))?;
//! let mut events = orchestrator.subscribe(&job.id)?;
//! while let Some(event) = events.next().await {
//!     print!("{}", event.to_sse());
//! }
//! ```

#![warn(unreachable_pub)]

pub mod backup;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod job;
pub mod orchestrator;
pub mod progress;
pub mod publish;
pub mod summary;

pub use backup::{
    BackupManager, BackupSnapshot, DirectoryRestoreTarget, InMemoryRestoreTarget, RestoreFailure,
    RestoreReport, RestoreTarget,
};
pub use config::{MigratorConfig, OrchestratorSettings, StreamSettings};
pub use error::{BackupError, FetchError, OrchestratorError, PublishError};
pub use fetcher::{FetchProgress, FetchProgressFn, LocalRepositoryFetcher, RepositoryFetcher};
pub use job::{
    allowed_transitions, validate_transition, Credential, JobProgress, JobStatus, MigrationJob,
    MigrationOptions, MigrationRequest, MigrationResult, RepositoryRef,
};
pub use orchestrator::{MigrationOrchestrator, OrchestratorBuilder};
pub use progress::{
    ListenerId, ProgressEvent, ProgressHub, ProgressListener, ProgressStream, Recipients,
    StreamEvent,
};
pub use publish::{
    publish_results, tree_entries, GitHubClient, PublishOutcome, PullRequest, PullRequestDraft,
    TreeEntry, MAX_FILES_PER_COMMIT,
};
pub use summary::{summarize, MigrationSummary, SummaryStatus};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running migrations
    pub use crate::{
        Credential, JobStatus, LocalRepositoryFetcher, MigrationJob, MigrationOptions,
        MigrationOrchestrator, MigrationRequest, MigratorConfig, OrchestratorError,
        ProgressEvent, RepositoryRef, StreamEvent,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
