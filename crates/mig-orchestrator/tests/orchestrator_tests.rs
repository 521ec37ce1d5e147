//! Job lifecycle through the public orchestrator API

use futures::StreamExt;
use mig_orchestrator::{
    Credential, FetchError, InMemoryRestoreTarget, JobStatus, MigrationJob, MigrationOptions,
    MigrationOrchestrator, MigrationRequest, MigratorConfig, OrchestratorError, ProgressEvent,
    RepositoryRef, StreamEvent,
};
use mig_test_utils::{sample_files, sample_spec, InMemoryFetcher, ScriptedSemanticEngine};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn request(options: MigrationOptions) -> MigrationRequest {
    MigrationRequest {
        repository: RepositoryRef::new("acme", "shop"),
        spec: sample_spec(),
        options,
    }
}

fn token() -> Option<Credential> {
    Some(Credential::new("ghp_test"))
}

fn orchestrator_with(fetcher: InMemoryFetcher, semantic: ScriptedSemanticEngine) -> MigrationOrchestrator {
    MigrationOrchestrator::builder(Arc::new(fetcher))
        .semantic_engine(Arc::new(semantic))
        .build()
}

fn orchestrator() -> MigrationOrchestrator {
    orchestrator_with(InMemoryFetcher::new(sample_files()), ScriptedSemanticEngine::new(90))
}

async fn wait_for_terminal(orchestrator: &MigrationOrchestrator, job_id: &str) -> MigrationJob {
    for _ in 0..500 {
        if let Some(job) = orchestrator.get_job(job_id) {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}

#[tokio::test]
async fn migration_completes_with_summary() {
    let orchestrator = orchestrator();
    let job = orchestrator
        .start_migration(request(MigrationOptions::default()), token())
        .unwrap();
    assert_eq!(job.status, JobStatus::Running);

    let job = wait_for_terminal(&orchestrator, &job.id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.completed_at.is_some());
    assert_eq!(job.progress.percentage, 100);

    let result = job.result.unwrap();
    let paths: Vec<&str> = result.results.keys().map(String::as_str).collect();
    assert_eq!(
        paths,
        vec![
            "pages/index.jsx",
            "pages/blog/[slug].jsx",
            "components/Nav.jsx",
            "styles/globals.css"
        ]
    );
    assert_eq!(result.summary.total_files, 4);
    assert_eq!(result.statistics.total_files, 4);
    assert!(!result.structure_changes.is_empty());
    assert!(!result.dry_run);
    assert_eq!(result.results["styles/globals.css"].confidence, 100);

    // Snapshot retained for rollback
    assert!(orchestrator.has_backup(&job.id));
}

#[tokio::test]
async fn start_requires_credential_and_valid_spec() {
    let orchestrator = orchestrator();

    let err = orchestrator
        .start_migration(request(MigrationOptions::default()), None)
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::MissingCredential));

    let err = orchestrator
        .start_migration(request(MigrationOptions::default()), Some(Credential::new("  ")))
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::MissingCredential));

    let mut bad = request(MigrationOptions::default());
    bad.spec.target.framework = String::new();
    let err = orchestrator.start_migration(bad, token()).unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidSpecification(_)));

    assert!(orchestrator.list_jobs().is_empty());
}

#[tokio::test]
async fn rollback_restores_snapshot_once() {
    let target = Arc::new(InMemoryRestoreTarget::new());
    let orchestrator = MigrationOrchestrator::builder(Arc::new(InMemoryFetcher::new(sample_files())))
        .semantic_engine(Arc::new(ScriptedSemanticEngine::new(90)))
        .restore_target(target.clone())
        .build();
    let job = orchestrator
        .start_migration(request(MigrationOptions::default()), token())
        .unwrap();
    wait_for_terminal(&orchestrator, &job.id).await;

    let report = orchestrator.rollback(&job.id).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.restored.len(), 4);
    assert_eq!(target.len(), 4);
    let original = &sample_files()[0];
    assert_eq!(target.get(&original.path).as_deref(), Some(original.content.as_str()));

    let job = orchestrator.get_job(&job.id).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.result.is_none());
    assert!(job.completed_at.is_none());
    assert!(!orchestrator.has_backup(&job.id));

    assert!(orchestrator.rollback(&job.id).await.is_err());
}

#[tokio::test]
async fn rollback_without_backup_fails() {
    let orchestrator = orchestrator();
    let job = orchestrator
        .start_migration(
            request(MigrationOptions {
                create_backups: Some(false),
                ..MigrationOptions::default()
            }),
            token(),
        )
        .unwrap();
    let job = wait_for_terminal(&orchestrator, &job.id).await;
    assert_eq!(job.status, JobStatus::Completed);

    let err = orchestrator.rollback(&job.id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NoBackup(_)));
    assert_eq!(orchestrator.get_job(&job.id).unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn dry_run_takes_no_snapshot() {
    let orchestrator = orchestrator();
    let job = orchestrator
        .start_migration(
            request(MigrationOptions {
                dry_run: true,
                ..MigrationOptions::default()
            }),
            token(),
        )
        .unwrap();
    let job = wait_for_terminal(&orchestrator, &job.id).await;
    assert!(job.result.unwrap().dry_run);
    assert!(!orchestrator.has_backup(&job.id));
}

#[tokio::test]
async fn rate_limited_fetch_fails_job() {
    let fetcher = InMemoryFetcher::failing(FetchError::Upstream {
        status: 429,
        message: "API rate limit exceeded".into(),
        retry_after_secs: Some(60),
    });
    let orchestrator = orchestrator_with(fetcher, ScriptedSemanticEngine::new(90));
    let job = orchestrator
        .start_migration(request(MigrationOptions::default()), token())
        .unwrap();
    let job = wait_for_terminal(&orchestrator, &job.id).await;

    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.unwrap();
    assert!(error.contains("429"), "{error}");
    assert!(error.contains("retry after 60s"), "{error}");
    assert!(!orchestrator.has_backup(&job.id));

    // Late subscribers get only the terminal event
    let events: Vec<StreamEvent> = orchestrator.subscribe(&job.id).unwrap().collect().await;
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], StreamEvent::Error { message, .. } if message == &error));
}

#[tokio::test]
async fn cancel_fails_job_once() {
    let fetcher = InMemoryFetcher::new(sample_files()).with_delay(Duration::from_millis(200));
    let orchestrator = orchestrator_with(fetcher, ScriptedSemanticEngine::new(90));
    let job = orchestrator
        .start_migration(request(MigrationOptions::default()), token())
        .unwrap();

    let errors = Arc::new(Mutex::new(0usize));
    let seen = errors.clone();
    orchestrator
        .track_progress(
            &job.id,
            Arc::new(move |event: &ProgressEvent| {
                if matches!(event, ProgressEvent::Error { .. }) {
                    *seen.lock() += 1;
                }
            }),
        )
        .unwrap();

    orchestrator.cancel(&job.id).unwrap();
    let cancelled = orchestrator.get_job(&job.id).unwrap();
    assert_eq!(cancelled.status, JobStatus::Failed);
    assert_eq!(cancelled.error.as_deref(), Some("migration cancelled"));

    // Execution winds down without overwriting the outcome
    tokio::time::sleep(Duration::from_millis(400)).await;
    let job = orchestrator.get_job(&job.id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("migration cancelled"));
    assert!(job.result.is_none());
    assert_eq!(*errors.lock(), 1);

    let err = orchestrator.cancel(&job.id).unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
}

#[tokio::test]
async fn pause_holds_completion_until_resume() {
    let semantic = ScriptedSemanticEngine::new(90).with_delay(Duration::from_millis(100));
    let orchestrator = MigrationOrchestrator::builder(Arc::new(InMemoryFetcher::new(sample_files())))
        .semantic_engine(Arc::new(semantic))
        .config({
            let mut config = MigratorConfig::default();
            config.transform.max_concurrency = 1;
            config
        })
        .build();
    let job = orchestrator
        .start_migration(request(MigrationOptions::default()), token())
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    orchestrator.pause(&job.id).unwrap();
    assert!(orchestrator.pause(&job.id).is_err());

    tokio::time::sleep(Duration::from_millis(500)).await;
    let paused = orchestrator.get_job(&job.id).unwrap();
    assert_eq!(paused.status, JobStatus::Paused);
    assert!(paused.result.is_none());
    assert!(paused.progress.processed_files < 4);

    orchestrator.resume(&job.id).unwrap();
    let job = wait_for_terminal(&orchestrator, &job.id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert!(matches!(
        orchestrator.pause(&job.id),
        Err(OrchestratorError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn live_stream_ends_with_complete() {
    let semantic = ScriptedSemanticEngine::new(90).with_delay(Duration::from_millis(30));
    let orchestrator = orchestrator_with(InMemoryFetcher::new(sample_files()), semantic);
    let job = orchestrator
        .start_migration(request(MigrationOptions::default()), token())
        .unwrap();

    let events: Vec<StreamEvent> = orchestrator.subscribe(&job.id).unwrap().collect().await;
    assert!(matches!(events.first(), Some(StreamEvent::Connected { .. })));
    assert!(matches!(events.last(), Some(StreamEvent::Complete { .. })));

    let percentages: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Progress { progress, .. } => Some(progress.percentage),
            _ => None,
        })
        .collect();
    assert!(percentages.windows(2).all(|w| w[0] <= w[1]), "{percentages:?}");
}

#[tokio::test]
async fn tracking_sends_snapshot_and_stops() {
    let orchestrator = orchestrator();
    let job = orchestrator
        .start_migration(request(MigrationOptions::default()), token())
        .unwrap();
    wait_for_terminal(&orchestrator, &job.id).await;

    let seen: Arc<Mutex<Vec<ProgressEvent>>> = Arc::default();
    let sink = seen.clone();
    let listener = orchestrator
        .track_progress(&job.id, Arc::new(move |e: &ProgressEvent| sink.lock().push(e.clone())))
        .unwrap();
    {
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], ProgressEvent::Complete { .. }));
    }

    assert!(orchestrator.stop_tracking_progress(&job.id, listener));
    assert!(!orchestrator.stop_tracking_progress(&job.id, listener));
    assert!(matches!(
        orchestrator.track_progress("nope", Arc::new(|_: &ProgressEvent| {})),
        Err(OrchestratorError::JobNotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tracker_attached_during_completion_sees_terminal_once() {
    for attempt in 0..25u64 {
        let orchestrator = orchestrator();
        let job = orchestrator
            .start_migration(request(MigrationOptions::default()), token())
            .unwrap();

        // Attach at varying points while the job races to completion
        tokio::time::sleep(Duration::from_micros(attempt * 150)).await;
        let terminal = Arc::new(Mutex::new(0usize));
        let seen = terminal.clone();
        orchestrator
            .track_progress(
                &job.id,
                Arc::new(move |event: &ProgressEvent| {
                    if event.is_terminal() {
                        *seen.lock() += 1;
                    }
                }),
            )
            .unwrap();

        wait_for_terminal(&orchestrator, &job.id).await;
        for _ in 0..100 {
            if *terminal.lock() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*terminal.lock(), 1, "attempt {attempt}");
    }
}

#[tokio::test]
async fn git_ref_option_overrides_repository() {
    let fetcher = Arc::new(InMemoryFetcher::new(sample_files()));
    let orchestrator = MigrationOrchestrator::builder(fetcher.clone()).build();
    let job = orchestrator
        .start_migration(
            request(MigrationOptions {
                git_ref: Some("feature/next".into()),
                ..MigrationOptions::default()
            }),
            token(),
        )
        .unwrap();
    assert_eq!(job.repository.git_ref.as_deref(), Some("feature/next"));
    wait_for_terminal(&orchestrator, &job.id).await;

    let requested = fetcher.requested();
    assert_eq!(requested.len(), 1);
    assert_eq!(requested[0].git_ref.as_deref(), Some("feature/next"));
}

#[tokio::test]
async fn sweep_removes_finished_jobs() {
    let orchestrator = orchestrator();
    let first = orchestrator
        .start_migration(request(MigrationOptions::default()), token())
        .unwrap();
    let second = orchestrator
        .start_migration(request(MigrationOptions::default()), token())
        .unwrap();
    wait_for_terminal(&orchestrator, &first.id).await;
    wait_for_terminal(&orchestrator, &second.id).await;

    let listed: Vec<String> = orchestrator.list_jobs().into_iter().map(|j| j.id).collect();
    assert_eq!(listed.len(), 2);

    assert_eq!(orchestrator.cleanup_finished_jobs(Duration::from_secs(3600)), 0);
    assert_eq!(orchestrator.cleanup_finished_jobs(Duration::ZERO), 2);
    assert!(orchestrator.get_job(&first.id).is_none());
    assert!(!orchestrator.has_backup(&first.id));
    assert!(orchestrator.list_jobs().is_empty());
}

#[tokio::test]
async fn sweep_removes_rolled_back_jobs() {
    let orchestrator = orchestrator();
    let job = orchestrator
        .start_migration(request(MigrationOptions::default()), token())
        .unwrap();
    wait_for_terminal(&orchestrator, &job.id).await;
    orchestrator.rollback(&job.id).await.unwrap();
    assert_eq!(orchestrator.get_job(&job.id).unwrap().status, JobStatus::Pending);

    assert_eq!(orchestrator.cleanup_finished_jobs(Duration::from_secs(3600)), 0);
    assert_eq!(orchestrator.cleanup_finished_jobs(Duration::ZERO), 1);
    assert!(orchestrator.get_job(&job.id).is_none());
}

#[tokio::test]
async fn unknown_job_errors() {
    let orchestrator = orchestrator();
    assert!(matches!(orchestrator.pause("x"), Err(OrchestratorError::JobNotFound(_))));
    assert!(matches!(orchestrator.resume("x"), Err(OrchestratorError::JobNotFound(_))));
    assert!(matches!(orchestrator.cancel("x"), Err(OrchestratorError::JobNotFound(_))));
    assert!(matches!(orchestrator.rollback("x").await, Err(OrchestratorError::JobNotFound(_))));
    assert!(orchestrator.subscribe("x").is_err());
}

#[tokio::test]
async fn sweeper_runs_until_orchestrator_dropped() {
    let orchestrator = MigrationOrchestrator::builder(Arc::new(InMemoryFetcher::new(sample_files())))
        .config(MigratorConfig::default())
        .semantic_engine(Arc::new(ScriptedSemanticEngine::new(90)))
        .build();
    let job = orchestrator
        .start_migration(request(MigrationOptions::default()), token())
        .unwrap();
    wait_for_terminal(&orchestrator, &job.id).await;

    let sweeper = orchestrator.spawn_sweeper(Duration::from_millis(20), Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(orchestrator.get_job(&job.id).is_none());

    drop(orchestrator);
    tokio::time::timeout(Duration::from_secs(1), sweeper)
        .await
        .unwrap()
        .unwrap();
}
