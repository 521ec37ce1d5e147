//! Migration orchestrator
//!
//! Owns the job table, the backup store and the progress hub. Jobs are
//! stored as `running` before their execution task is spawned, so a
//! subscriber can attach as soon as `start_migration` returns.
//!
//! Execution: fetch -> backup -> batch transform -> summary -> complete.
//! Every path out of execution, including a panic in the task, leaves the
//! job terminal and publishes exactly one terminal event.

use crate::backup::{BackupManager, InMemoryRestoreTarget, RestoreReport, RestoreTarget};
use crate::config::MigratorConfig;
use crate::error::OrchestratorError;
use crate::fetcher::{FetchProgress, RepositoryFetcher};
use crate::job::{
    Credential, JobProgress, JobStatus, MigrationJob, MigrationRequest, MigrationResult,
};
use crate::progress::{
    ListenerId, ProgressEvent, ProgressListener, ProgressStream, StreamEvent,
};
use crate::summary::summarize;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mig_layout::plan_structure_changes;
use mig_transform::{
    get_transformation_statistics, BatchProgress, HybridTransformationEngine, JobControl,
    PassthroughSemanticEngine, SemanticEngine,
};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use ulid::Ulid;

struct JobEntry {
    job: MigrationJob,
    control: JobControl,
    /// Set when a rollback returns the job to `pending`
    rolled_back_at: Option<DateTime<Utc>>,
}

/// Outcome of trying to commit a job's result
enum Commit {
    Done,
    /// Job is paused; the result waits for resume
    Paused(Box<MigrationResult>),
}

struct Inner {
    jobs: DashMap<String, JobEntry>,
    backups: BackupManager,
    hub: crate::progress::ProgressHub,
    engine: HybridTransformationEngine,
    fetcher: Arc<dyn RepositoryFetcher>,
    restore_target: Arc<dyn RestoreTarget>,
    config: MigratorConfig,
}

/// Builder for [`MigrationOrchestrator`]
pub struct OrchestratorBuilder {
    fetcher: Arc<dyn RepositoryFetcher>,
    config: MigratorConfig,
    semantic: Arc<dyn SemanticEngine>,
    restore_target: Arc<dyn RestoreTarget>,
}

impl OrchestratorBuilder {
    /// Configuration
    #[must_use]
    pub fn config(mut self, config: MigratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Semantic engine used by the default pipeline
    #[must_use]
    pub fn semantic_engine(mut self, semantic: Arc<dyn SemanticEngine>) -> Self {
        self.semantic = semantic;
        self
    }

    /// Where rollbacks write restored files
    #[must_use]
    pub fn restore_target(mut self, target: Arc<dyn RestoreTarget>) -> Self {
        self.restore_target = target;
        self
    }

    /// Build
    #[must_use]
    pub fn build(self) -> MigrationOrchestrator {
        let config = self.config;
        let engine = HybridTransformationEngine::new(
            config.transform,
            self.semantic,
            Arc::new(config.recovery.default_strategy()),
        );
        MigrationOrchestrator {
            inner: Arc::new(Inner {
                jobs: DashMap::new(),
                backups: BackupManager::new(),
                hub: crate::progress::ProgressHub::new(config.orchestrator.event_buffer),
                engine,
                fetcher: self.fetcher,
                restore_target: self.restore_target,
                config,
            }),
        }
    }
}

/// Runs and controls migration jobs
#[derive(Clone)]
pub struct MigrationOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MigrationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationOrchestrator")
            .field("jobs", &self.inner.jobs.len())
            .field("backups", &self.inner.backups.len())
            .field("engine", &self.inner.engine)
            .finish_non_exhaustive()
    }
}

fn progress_event(job: &MigrationJob, message: impl Into<String>) -> ProgressEvent {
    ProgressEvent::Progress {
        job_id: job.id.clone(),
        status: job.status,
        progress: job.progress.clone(),
        message: message.into(),
        timestamp: Utc::now(),
    }
}

fn terminal_event(job: &MigrationJob) -> Option<ProgressEvent> {
    match (job.status, &job.result, &job.error) {
        (JobStatus::Completed, Some(result), _) => Some(ProgressEvent::Complete {
            job_id: job.id.clone(),
            result: Box::new(result.clone()),
            timestamp: Utc::now(),
        }),
        (JobStatus::Failed, _, error) => Some(ProgressEvent::Error {
            job_id: job.id.clone(),
            message: error.clone().unwrap_or_else(|| "migration failed".to_string()),
            timestamp: Utc::now(),
        }),
        _ => None,
    }
}

fn eta_seconds(started: Instant, processed: usize, total: usize) -> Option<u64> {
    if processed == 0 || processed >= total {
        return None;
    }
    let per_file = started.elapsed().as_secs_f64() / processed as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some((per_file * (total - processed) as f64).ceil() as u64)
}

impl Inner {
    fn with_job<T>(
        &self,
        job_id: &str,
        f: impl FnOnce(&mut JobEntry) -> Result<T, OrchestratorError>,
    ) -> Result<T, OrchestratorError> {
        let mut entry = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;
        f(entry.value_mut())
    }

    fn publish_progress(&self, job_id: &str, message: &str) {
        let event = self
            .jobs
            .get(job_id)
            .map(|entry| progress_event(&entry.job, message));
        if let Some(event) = event {
            self.hub.publish(&event);
        }
    }

    async fn execute(&self, job_id: &str) -> Result<MigrationResult, OrchestratorError> {
        let (repository, spec, options, control) = self.with_job(job_id, |entry| {
            Ok((
                entry.job.repository.clone(),
                entry.job.spec.clone(),
                entry.job.options.clone(),
                entry.control.clone(),
            ))
        })?;

        tracing::info!(job_id, repository = %repository.slug(), spec = %spec.label(), "migration started");
        self.publish_progress(job_id, "Fetching repository files");

        let on_fetch = |p: FetchProgress| {
            if p.fetched == p.total || p.fetched % 25 == 0 {
                self.publish_progress(job_id, &format!("Fetched {}/{} files", p.fetched, p.total));
            }
        };
        let files = self
            .fetcher
            .fetch_all_source_files(&repository, &on_fetch)
            .await?;
        tracing::info!(job_id, files = files.len(), "repository fetched");

        if control.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        let backup = options
            .create_backups
            .unwrap_or(self.config.orchestrator.create_backups)
            && !options.dry_run;
        if backup {
            self.backups.create_backup(job_id, &files)?;
            self.publish_progress(job_id, "Backup created");
        }

        self.with_job(job_id, |entry| {
            entry.job.progress = JobProgress {
                total_files: files.len(),
                ..JobProgress::default()
            };
            Ok(())
        })?;
        self.publish_progress(job_id, "Transforming files");

        let started = Instant::now();
        let on_batch = |p: BatchProgress| {
            let event = self.jobs.get_mut(job_id).map(|mut entry| {
                entry.job.progress = JobProgress {
                    total_files: p.total_files,
                    processed_files: p.processed_files,
                    percentage: p.percentage,
                    current_file: p.current_file.clone(),
                    eta_seconds: eta_seconds(started, p.processed_files, p.total_files),
                };
                let message = match &p.current_file {
                    Some(path) => format!("Transformed {path}"),
                    None => "Transformation finished".to_string(),
                };
                progress_event(&entry.job, message)
            });
            if let Some(event) = event {
                self.hub.publish(&event);
            }
        };
        let results = self
            .engine
            .transform_batch(&files, &spec, Some(&control), on_batch)
            .await;

        let structure_changes = plan_structure_changes(&files, &spec);
        let summary = summarize(
            &results,
            &structure_changes,
            self.config.transform.review_threshold,
        );
        let statistics = get_transformation_statistics(results.values());
        Ok(MigrationResult {
            results,
            structure_changes,
            summary,
            statistics,
            dry_run: options.dry_run,
        })
    }

    /// Commit `outcome` and publish the terminal event, holding a success
    /// until the job is resumed if it was paused in the meantime
    async fn finish(&self, job_id: &str, mut outcome: Result<MigrationResult, OrchestratorError>) {
        while let Commit::Paused(result) = self.commit(job_id, outcome) {
            let control = self.jobs.get(job_id).map(|e| e.control.clone());
            let runnable = match control {
                Some(control) => control.wait_until_runnable().await,
                None => false,
            };
            // Cancel wins
            outcome = if runnable {
                Ok(*result)
            } else {
                Err(OrchestratorError::Cancelled)
            };
        }
    }

    fn commit(&self, job_id: &str, outcome: Result<MigrationResult, OrchestratorError>) -> Commit {
        let Some(mut entry) = self.jobs.get_mut(job_id) else {
            tracing::warn!(job_id, "job vanished before completion");
            return Commit::Done;
        };
        let job = &mut entry.job;
        if job.status.is_terminal() {
            // Cancelled while running; the cancel already published
            tracing::debug!(job_id, status = %job.status, "discarding late outcome");
            let failed = job.status == JobStatus::Failed;
            drop(entry);
            // A snapshot taken after the cancel's cleanup
            if failed {
                self.backups.cleanup(job_id);
            }
            return Commit::Done;
        }
        match outcome {
            Ok(result) if job.status == JobStatus::Paused => {
                return Commit::Paused(Box::new(result));
            }
            Ok(result) => {
                if let Err(error) = job.transition(JobStatus::Completed) {
                    tracing::warn!(job_id, %error, "cannot complete job");
                    return Commit::Done;
                }
                job.progress.percentage = 100;
                job.progress.processed_files = job.progress.total_files;
                job.progress.current_file = None;
                job.progress.eta_seconds = None;
                tracing::info!(
                    job_id,
                    files = result.summary.total_files,
                    status = ?result.summary.status,
                    average_confidence = result.summary.average_confidence,
                    "migration completed"
                );
                job.result = Some(result);
            }
            Err(error) => {
                if let Err(invalid) = job.transition(JobStatus::Failed) {
                    tracing::warn!(job_id, %invalid, "cannot fail job");
                    return Commit::Done;
                }
                tracing::error!(job_id, %error, rate_limited = error.is_rate_limited(), "migration failed");
                job.error = Some(error.to_string());
            }
        }
        let event = terminal_event(job);
        let completed = job.status == JobStatus::Completed;
        // Captured under the job lock; see `track_progress`
        let recipients = self.hub.recipients(job_id);
        drop(entry);

        if !completed || !self.config.orchestrator.retain_backups_after_success {
            self.backups.cleanup(job_id);
        }
        if let Some(event) = event {
            recipients.deliver(&event);
        }
        Commit::Done
    }
}

impl MigrationOrchestrator {
    /// Builder over `fetcher` with default config and the passthrough semantic engine
    #[must_use]
    pub fn builder(fetcher: Arc<dyn RepositoryFetcher>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            fetcher,
            config: MigratorConfig::default(),
            semantic: Arc::new(PassthroughSemanticEngine::default()),
            restore_target: Arc::new(InMemoryRestoreTarget::new()),
        }
    }

    /// Start a job and return it in the `running` state
    ///
    /// Execution continues on a spawned task; must be called within a
    /// tokio runtime.
    ///
    /// # Errors
    /// `MissingCredential` or `InvalidSpecification`
    pub fn start_migration(
        &self,
        request: MigrationRequest,
        credential: Option<Credential>,
    ) -> Result<MigrationJob, OrchestratorError> {
        let credential = credential
            .filter(|c| !c.is_blank())
            .ok_or(OrchestratorError::MissingCredential)?;
        request.spec.validate()?;

        let id = Ulid::new().to_string();
        let job = MigrationJob::new(id.clone(), request, credential);
        let snapshot = job.clone();
        self.inner.jobs.insert(
            id.clone(),
            JobEntry {
                job,
                control: JobControl::new(),
                rolled_back_at: None,
            },
        );
        self.spawn_execution(id);
        Ok(snapshot)
    }

    fn spawn_execution(&self, job_id: String) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let worker = {
                let inner = Arc::clone(&inner);
                let job_id = job_id.clone();
                tokio::spawn(async move { inner.execute(&job_id).await })
            };
            let outcome = match worker.await {
                Ok(outcome) => outcome,
                Err(join) => Err(OrchestratorError::Aborted(join.to_string())),
            };
            inner.finish(&job_id, outcome).await;
        });
    }

    /// Current state of a job
    #[must_use]
    pub fn get_job(&self, job_id: &str) -> Option<MigrationJob> {
        self.inner.jobs.get(job_id).map(|e| e.job.clone())
    }

    /// All jobs, newest first
    #[must_use]
    pub fn list_jobs(&self) -> Vec<MigrationJob> {
        let mut jobs: Vec<MigrationJob> = self.inner.jobs.iter().map(|e| e.job.clone()).collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.id.cmp(&a.id)));
        jobs
    }

    /// Pause a running job
    ///
    /// # Errors
    /// `JobNotFound` or `InvalidTransition` unless the job is running
    pub fn pause(&self, job_id: &str) -> Result<(), OrchestratorError> {
        self.inner.with_job(job_id, |entry| {
            entry.job.transition(JobStatus::Paused)?;
            entry.control.pause();
            Ok(())
        })?;
        tracing::info!(job_id, "migration paused");
        self.inner.publish_progress(job_id, "Migration paused");
        Ok(())
    }

    /// Resume a paused job
    ///
    /// # Errors
    /// `JobNotFound` or `InvalidTransition` unless the job is paused
    pub fn resume(&self, job_id: &str) -> Result<(), OrchestratorError> {
        self.inner.with_job(job_id, |entry| {
            entry.job.transition(JobStatus::Running)?;
            entry.control.resume();
            Ok(())
        })?;
        tracing::info!(job_id, "migration resumed");
        self.inner.publish_progress(job_id, "Migration resumed");
        Ok(())
    }

    /// Cancel a running or paused job
    ///
    /// Transforms already in flight finish; no new file starts.
    ///
    /// # Errors
    /// `JobNotFound` or `InvalidTransition` once terminal
    pub fn cancel(&self, job_id: &str) -> Result<(), OrchestratorError> {
        let (event, recipients) = self.inner.with_job(job_id, |entry| {
            entry.job.transition(JobStatus::Failed)?;
            entry.job.error = Some(OrchestratorError::Cancelled.to_string());
            entry.control.cancel();
            Ok((terminal_event(&entry.job), self.inner.hub.recipients(job_id)))
        })?;
        self.inner.backups.cleanup(job_id);
        tracing::info!(job_id, "migration cancelled");
        if let Some(event) = event {
            recipients.deliver(&event);
        }
        Ok(())
    }

    /// Restore the pre-migration snapshot of a completed job
    ///
    /// The job returns to `pending` with its result cleared. The snapshot
    /// is consumed even when some paths fail to restore.
    ///
    /// # Errors
    /// `JobNotFound`, `InvalidTransition` unless completed, `NoBackup`
    pub async fn rollback(&self, job_id: &str) -> Result<RestoreReport, OrchestratorError> {
        self.inner.with_job(job_id, |entry| {
            crate::job::validate_transition(entry.job.status, JobStatus::Pending)
        })?;
        if !self.inner.backups.has_backup(job_id) {
            return Err(OrchestratorError::NoBackup(job_id.to_string()));
        }

        let report = self
            .inner
            .backups
            .restore(job_id, self.inner.restore_target.as_ref())
            .await?;

        self.inner.with_job(job_id, |entry| {
            entry.job.transition(JobStatus::Pending)?;
            entry.job.result = None;
            entry.job.completed_at = None;
            entry.job.error = None;
            entry.job.progress = JobProgress::default();
            entry.rolled_back_at = Some(Utc::now());
            Ok(())
        })?;
        tracing::info!(
            job_id,
            restored = report.restored.len(),
            failed = report.errors.len(),
            "migration rolled back"
        );
        self.inner.publish_progress(job_id, "Migration rolled back");
        Ok(report)
    }

    /// Whether a rollback snapshot exists for the job
    #[must_use]
    pub fn has_backup(&self, job_id: &str) -> bool {
        self.inner.backups.has_backup(job_id)
    }

    /// Register `callback` for the job's events
    ///
    /// The callback immediately receives one snapshot: the terminal event
    /// for finished jobs, a progress event otherwise. Either way it sees the
    /// terminal event exactly once.
    ///
    /// # Errors
    /// `JobNotFound`
    pub fn track_progress(
        &self,
        job_id: &str,
        callback: ProgressListener,
    ) -> Result<ListenerId, OrchestratorError> {
        // Terminal commits capture recipients under the same lock, so the
        // listener is either captured or sees the terminal snapshot
        let (id, snapshot) = self.inner.with_job(job_id, |entry| {
            let id = self.inner.hub.register(job_id, callback);
            let snapshot = terminal_event(&entry.job)
                .unwrap_or_else(|| progress_event(&entry.job, "Current status"));
            Ok((id, snapshot))
        })?;
        self.inner.hub.notify_one(job_id, id, &snapshot);
        Ok(id)
    }

    /// Remove a callback; returns whether it was registered
    pub fn stop_tracking_progress(&self, job_id: &str, listener: ListenerId) -> bool {
        self.inner.hub.unregister(job_id, listener)
    }

    /// Event stream for the job
    ///
    /// # Errors
    /// `JobNotFound`
    pub fn subscribe(&self, job_id: &str) -> Result<ProgressStream, OrchestratorError> {
        if !self.inner.jobs.contains_key(job_id) {
            return Err(OrchestratorError::JobNotFound(job_id.to_string()));
        }
        // Subscribe before reading status so no terminal event slips between
        let rx = self.inner.hub.subscribe(job_id);
        let job = self
            .get_job(job_id)
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;
        if let Some(terminal) = terminal_event(&job) {
            return Ok(ProgressStream::terminal(terminal.into()));
        }
        let stream = &self.inner.config.stream;
        Ok(ProgressStream::live(
            StreamEvent::Connected {
                job_id: job.id.clone(),
                status: job.status,
                progress: job.progress,
            },
            rx,
            job.id,
            stream.keepalive(),
            stream.max_duration(),
        ))
    }

    /// Remove terminal jobs older than `max_age` with their backups and listeners
    ///
    /// Rolled-back jobs count once their rollback is older than `max_age`.
    /// Returns the number of jobs removed.
    pub fn cleanup_finished_jobs(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now().checked_sub_signed(max_age);
        let stale: Vec<String> = self
            .inner
            .jobs
            .iter()
            .filter(|e| {
                let idle_since = match e.job.status {
                    JobStatus::Completed | JobStatus::Failed => e.job.completed_at,
                    JobStatus::Pending if !self.inner.backups.has_backup(e.key()) => {
                        e.rolled_back_at
                    }
                    _ => None,
                };
                matches!((idle_since, cutoff), (Some(since), Some(cutoff)) if since <= cutoff)
            })
            .map(|e| e.key().clone())
            .collect();
        for id in &stale {
            self.inner.jobs.remove(id);
            self.inner.backups.cleanup(id);
            self.inner.hub.remove_job(id);
        }
        if !stale.is_empty() {
            tracing::info!(removed = stale.len(), "swept finished jobs");
        }
        stale.len()
    }

    /// Periodically sweep finished jobs until the orchestrator is dropped
    #[must_use]
    pub fn spawn_sweeper(&self, interval: Duration, max_age: Duration) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                MigrationOrchestrator { inner }.cleanup_finished_jobs(max_age);
            }
            tracing::debug!("sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::LocalRepositoryFetcher;
    use crate::job::RepositoryRef;
    use indexmap::IndexMap;
    use mig_core::{
        ExportStyle, Language, LayoutConvention, MigrationSpecification, NamingConvention,
        RoutingModel, SourceConfig, TargetConfig,
    };

    fn spec() -> MigrationSpecification {
        MigrationSpecification::new(
            SourceConfig {
                language: Language::JavaScript,
                framework: "react".into(),
                version: "18.2.0".into(),
                routing: RoutingModel::PagesDirectory,
                patterns: vec![],
            },
            TargetConfig {
                language: Language::JavaScript,
                framework: "next".into(),
                version: "14.0.0".into(),
                routing: RoutingModel::AppDirectory,
                layout: LayoutConvention::AppRouter,
                naming: NamingConvention::KebabCase,
                exports: ExportStyle::Default,
                client_directive: false,
            },
        )
    }

    fn empty_result() -> MigrationResult {
        let results = IndexMap::new();
        MigrationResult {
            summary: summarize(&results, &[], 70),
            statistics: get_transformation_statistics(results.values()),
            results,
            structure_changes: vec![],
            dry_run: false,
        }
    }

    /// Orchestrator holding one job in `status`, without an execution task
    fn with_job(status: JobStatus) -> (MigrationOrchestrator, String) {
        let orchestrator =
            MigrationOrchestrator::builder(Arc::new(LocalRepositoryFetcher::new("."))).build();
        let request = MigrationRequest {
            repository: RepositoryRef::new("acme", "shop"),
            spec: spec(),
            options: crate::job::MigrationOptions::default(),
        };
        let mut job = MigrationJob::new("job-1".into(), request, Credential::new("t"));
        let control = JobControl::new();
        if status == JobStatus::Paused {
            job.transition(JobStatus::Paused).unwrap();
            control.pause();
        }
        orchestrator.inner.jobs.insert(
            job.id.clone(),
            JobEntry {
                job,
                control,
                rolled_back_at: None,
            },
        );
        (orchestrator, "job-1".to_string())
    }

    #[tokio::test]
    async fn paused_job_completes_only_after_resume() {
        let (orchestrator, id) = with_job(JobStatus::Paused);
        let finishing = {
            let inner = Arc::clone(&orchestrator.inner);
            let id = id.clone();
            tokio::spawn(async move { inner.finish(&id, Ok(empty_result())).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!finishing.is_finished());
        let job = orchestrator.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Paused);
        assert!(job.result.is_none());

        orchestrator.resume(&id).unwrap();
        finishing.await.unwrap();
        let job = orchestrator.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.result.is_some());
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn cancel_while_held_keeps_failure() {
        let (orchestrator, id) = with_job(JobStatus::Paused);
        let finishing = {
            let inner = Arc::clone(&orchestrator.inner);
            let id = id.clone();
            tokio::spawn(async move { inner.finish(&id, Ok(empty_result())).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        orchestrator.cancel(&id).unwrap();
        finishing.await.unwrap();
        let job = orchestrator.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("migration cancelled"));
        assert!(job.result.is_none());
    }

    #[test]
    fn eta_is_proportional() {
        let started = Instant::now() - Duration::from_secs(10);
        let eta = eta_seconds(started, 5, 10).unwrap();
        assert!((10..=11).contains(&eta));
        assert_eq!(eta_seconds(started, 0, 10), None);
        assert_eq!(eta_seconds(started, 10, 10), None);
    }
}
