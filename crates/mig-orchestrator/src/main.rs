use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use futures::StreamExt;
use mig_core::MigrationSpecification;
use mig_orchestrator::{
    Credential, JobStatus, LocalRepositoryFetcher, MigrationOptions, MigrationOrchestrator,
    MigrationRequest, MigrationResult, MigratorConfig, RepositoryRef, StreamEvent,
};
use mig_planner::{
    create_plan, generate_execution_timeline, optimize_plan, validate_plan, Aggressiveness,
    CodebaseStats, DetectedPattern, PlanCustomization,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Input of `mig plan`: analyzer output for the source repository
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Analysis {
    patterns: Vec<DetectedPattern>,
    stats: CodebaseStats,
}

fn cli() -> Command {
    let spec_arg = Arg::new("spec")
        .long("spec")
        .short('s')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Migration specification (.json, .toml or .yaml)");
    let repo_arg = Arg::new("repo")
        .long("repo")
        .short('r')
        .default_value(".")
        .value_parser(value_parser!(PathBuf))
        .help("Checked-out source repository");

    Command::new("mig")
        .version(mig_orchestrator::VERSION)
        .about("Repository-wide front-end framework migration")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("plan")
                .about("Build a phased migration plan from analyzer output")
                .arg(spec_arg.clone())
                .arg(
                    Arg::new("analysis")
                        .long("analysis")
                        .short('a')
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON file with detected patterns and codebase stats"),
                )
                .arg(
                    Arg::new("aggressiveness")
                        .long("aggressiveness")
                        .default_value("balanced")
                        .value_parser(["conservative", "balanced", "aggressive"])
                        .help("How hard automation is pushed"),
                )
                .arg(
                    Arg::new("no-tests")
                        .long("no-tests")
                        .action(ArgAction::SetTrue)
                        .help("Leave the test-suite task out of verification"),
                )
                .arg(
                    Arg::new("exclude")
                        .long("exclude")
                        .action(ArgAction::Append)
                        .help("Pattern name to leave out (repeatable)"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("migrate")
                .about("Transform a repository and write the result")
                .arg(spec_arg)
                .arg(repo_arg)
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .value_parser(value_parser!(PathBuf))
                        .help("Output directory; required unless --dry-run"),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Report results without writing files"),
                )
                .arg(
                    Arg::new("no-backup")
                        .long("no-backup")
                        .action(ArgAction::SetTrue)
                        .help("Skip the rollback snapshot"),
                )
                .arg(
                    Arg::new("concurrency")
                        .long("concurrency")
                        .value_parser(value_parser!(usize))
                        .help("Concurrent file transforms"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

fn load_spec(path: &Path) -> Result<MigrationSpecification> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading specification {}", path.display()))?;
    let spec: MigrationSpecification = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&text)?,
        Some("yaml" | "yml") => serde_yaml::from_str(&text)?,
        _ => serde_json::from_str(&text)?,
    };
    spec.validate()
        .with_context(|| format!("invalid specification {}", path.display()))?;
    Ok(spec)
}

fn repository_ref(root: &Path) -> RepositoryRef {
    let name = root
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "repository".to_string());
    RepositoryRef::new("local", name)
}

fn run_plan(args: &ArgMatches) -> Result<()> {
    let spec = load_spec(args.get_one::<PathBuf>("spec").context("--spec")?)?;
    let analysis: Analysis = match args.get_one::<PathBuf>("analysis") {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading analysis {}", path.display()))?;
            serde_json::from_str(&text)?
        }
        None => Analysis::default(),
    };
    let aggressiveness = match args.get_one::<String>("aggressiveness").map(String::as_str) {
        Some("conservative") => Aggressiveness::Conservative,
        Some("aggressive") => Aggressiveness::Aggressive,
        _ => Aggressiveness::Balanced,
    };
    let customization = PlanCustomization {
        aggressiveness,
        include_tests: !args.get_flag("no-tests"),
        excluded_patterns: args
            .get_many::<String>("exclude")
            .map(|v| v.cloned().collect())
            .unwrap_or_default(),
    };

    let plan = optimize_plan(create_plan(
        &spec.source,
        &spec.target,
        &analysis.patterns,
        &analysis.stats,
        Some(customization),
    ));
    let validation = validate_plan(&plan);
    let timeline = generate_execution_timeline(&plan);

    if args.get_flag("json") {
        let out = serde_json::json!({
            "plan": plan,
            "validation": validation,
            "timeline": timeline,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Migration plan: {}", spec.label());
        println!(
            "Complexity: {:?} ({}/100)",
            plan.complexity.level, plan.complexity.score
        );
        println!();
        for phase in &plan.phases {
            println!(
                "{} [{} tasks, {} min, {} min automated, risk {:?}]",
                phase.name,
                phase.tasks.len(),
                phase.total_minutes,
                phase.automated_minutes,
                phase.risk_level
            );
            for task in &phase.tasks {
                println!("  - {} ({:?}, {} min)", task.name, task.task_type, task.estimated_minutes);
            }
        }
        println!();
        println!(
            "Timeline: {} min sequential, {} min parallel, {} batches",
            timeline.sequential_minutes,
            timeline.parallel_minutes,
            timeline.batches.len()
        );
        println!("Automation saves {}%", plan.summary.automation_percentage);
        for rec in &plan.complexity.recommendations {
            println!("  * {rec}");
        }
        if !validation.valid {
            for error in &validation.errors {
                eprintln!("plan error: {error}");
            }
        }
    }
    if !validation.valid {
        bail!("plan failed validation");
    }
    Ok(())
}

fn write_outputs(out: &Path, result: &MigrationResult) -> Result<usize> {
    let mut written = 0;
    for (path, file) in &result.results {
        if file.new_path.is_empty() {
            continue;
        }
        let target = out.join(&file.new_path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(&target, &file.code)
            .with_context(|| format!("writing {} (from {path})", target.display()))?;
        written += 1;
    }
    std::fs::write(
        out.join("migration-summary.json"),
        serde_json::to_string_pretty(result)?,
    )?;
    Ok(written)
}

async fn run_migrate(args: &ArgMatches, mut config: MigratorConfig) -> Result<()> {
    let spec = load_spec(args.get_one::<PathBuf>("spec").context("--spec")?)?;
    let root = args.get_one::<PathBuf>("repo").context("--repo")?.clone();
    let dry_run = args.get_flag("dry-run");
    let out = args.get_one::<PathBuf>("out").cloned();
    if out.is_none() && !dry_run {
        bail!("--out is required unless --dry-run is given");
    }
    if let Some(n) = args.get_one::<usize>("concurrency") {
        config.transform.max_concurrency = *n;
        config.validate()?;
    }

    let orchestrator = MigrationOrchestrator::builder(Arc::new(LocalRepositoryFetcher::new(&root)))
        .config(config)
        .build();
    let request = MigrationRequest {
        repository: repository_ref(&root),
        spec,
        options: MigrationOptions {
            create_backups: Some(!args.get_flag("no-backup")),
            dry_run,
            git_ref: None,
        },
    };
    // Local checkouts need no hosting token
    let job = orchestrator.start_migration(request, Some(Credential::new("local")))?;
    let mut events = orchestrator.subscribe(&job.id)?;
    while let Some(event) = events.next().await {
        match &event {
            StreamEvent::Progress { progress, message, .. } => {
                eprintln!("[{:>3}%] {message}", progress.percentage);
            }
            StreamEvent::Error { message, .. } => eprintln!("error: {message}"),
            _ => {}
        }
        if event.is_terminal() {
            break;
        }
    }

    let job = orchestrator
        .get_job(&job.id)
        .context("job disappeared")?;
    let result = match (job.status, job.result) {
        (JobStatus::Completed, Some(result)) => result,
        _ => bail!(job.error.unwrap_or_else(|| "migration did not complete".into())),
    };

    let s = &result.summary;
    println!("Status: {:?}", s.status);
    println!(
        "Files: {} total, {} transformed, {} unchanged",
        s.total_files, s.transformed_files, s.unchanged_files
    );
    println!("Lines: +{} -{}", s.lines_added, s.lines_removed);
    println!(
        "Confidence: {:.1} average, {} need review",
        s.average_confidence, s.requires_review
    );
    println!("Structure changes: {}", s.structure_changes);

    match out {
        Some(out) if !dry_run => {
            let written = write_outputs(&out, &result)?;
            println!("Wrote {written} files to {}", out.display());
        }
        _ => println!("Dry run: nothing written"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));
    let config = MigratorConfig::from_env_and_file(
        matches.get_one::<PathBuf>("config").map(PathBuf::as_path),
    )?;

    match matches.subcommand() {
        Some(("plan", args)) => run_plan(args),
        Some(("migrate", args)) => run_migrate(args, config).await,
        _ => {
            cli().print_help()?;
            Ok(())
        }
    }
}
