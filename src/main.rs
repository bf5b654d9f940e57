use anyhow::{Context, Result};
use logship::cli::commands::{
    DescriptorKind, HistoryCommand, InitCommand, ServeCommand, ShipCommand, TriageCommand, ValidateCommand,
};
use logship::cli::output::*;
use logship::cli::{Cli, Command};
use logship::core::pipeline_config::{PipelineConfig, DEFAULT_PIPELINE_YAML};
use logship::core::workflow_config::{WorkflowConfig, DEFAULT_WORKFLOW_YAML};
use logship::core::{ExecutionStatus, IssueEvent};
use logship::execution::WorkflowEngine;
use logship::persistence::{create_summary, PersistenceBackend, RunSummary};
#[cfg(not(feature = "sqlite"))]
use logship::persistence::InMemoryPersistence;
#[cfg(feature = "sqlite")]
use logship::persistence::SqliteRunStore;
use logship::service::PipelineService;
use logship::shipper::{collect_files, read_log_files, Shipper};
use logship::tracker::{GitHubClient, InMemoryTracker, IssueTracker, TrackerClientConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    match &cli.command {
        Command::Serve(cmd) => serve(cmd).await?,
        Command::Validate(cmd) => validate(cmd)?,
        Command::Triage(cmd) => triage(cmd).await?,
        Command::Ship(cmd) => ship(cmd).await?,
        Command::History(cmd) => show_history(cmd).await?,
        Command::Init(cmd) => init(cmd)?,
    }

    Ok(())
}

async fn serve(cmd: &ServeCommand) -> Result<()> {
    let config = match &cmd.file {
        Some(path) => PipelineConfig::from_file(path).context("Failed to load pipeline config")?,
        None => PipelineConfig::default_stack()?,
    };

    let service = PipelineService::start(&config).await?;
    println!(
        "{} Pipeline {} running",
        ROCKET,
        style(service.name()).bold()
    );
    for (input, addr) in config.inputs.iter().zip(service.local_addrs()) {
        println!("  {} {} on {}", INFO, style(input.protocol()).cyan(), addr);
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    println!("\n{} Shutting down... (Ctrl-C again to force)", INFO);

    let stats = tokio::select! {
        stats = service.shutdown() => stats?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("{} Forced exit, buffered events were not flushed", WARN);
            std::process::exit(130);
        }
    };
    println!(
        "{} Processed {} events in {} batches ({} failed writes)",
        if stats.failed_writes == 0 { CHECK } else { WARN },
        style(stats.events).cyan(),
        stats.batches,
        stats.failed_writes
    );
    Ok(())
}

fn validate(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating {}...", INFO, cmd.file.display());

    let result = match cmd.kind {
        DescriptorKind::Pipeline => PipelineConfig::from_file(&cmd.file).and_then(|config| {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Inputs: {}", style(config.inputs.len()).cyan());
            println!("  Filters: {}", style(config.filters.len()).cyan());
            println!("  Outputs: {}", style(config.outputs.len()).cyan());
            Ok(serde_json::to_string_pretty(&config)?)
        }),
        DescriptorKind::Workflow => WorkflowConfig::from_file(&cmd.file).and_then(|config| {
            println!("{} Workflow configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Trigger label: {}", style(&config.trigger.label).cyan());
            println!("  Steps: {}", style(config.steps.len()).cyan());
            Ok(serde_json::to_string_pretty(&config)?)
        }),
    };

    match result {
        Ok(json) => {
            if cmd.json {
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn triage(cmd: &TriageCommand) -> Result<()> {
    let config = match &cmd.workflow {
        Some(path) => WorkflowConfig::from_file(path).context("Failed to load workflow config")?,
        None => WorkflowConfig::default_workflow()?,
    };

    let payload = std::fs::read_to_string(&cmd.event)
        .with_context(|| format!("Failed to read event {}", cmd.event.display()))?;
    let mut event = IssueEvent::from_json(&payload).context("Failed to parse issue event")?;
    if let Some(repo) = &cmd.repo {
        event = event.with_repository(repo);
    }

    println!(
        "{} Loaded workflow: {}",
        INFO,
        style(&config.name).bold()
    );

    let tracker: Arc<dyn IssueTracker> = if cmd.dry_run {
        println!("{} Dry run: changes are applied to an in-memory copy", WARN);
        Arc::new(InMemoryTracker::with_issues([event.issue.clone()]))
    } else {
        let mut tracker_config = TrackerClientConfig::from_env();
        if let Some(repo) = cmd.repo.clone().or_else(|| event.repository_name().map(str::to_string)) {
            tracker_config = tracker_config.with_repository(repo);
        }
        Arc::new(GitHubClient::new(tracker_config).context("Failed to create GitHub client")?)
    };

    let engine = WorkflowEngine::new(tracker);
    engine.add_event_handler(|event| println!("{}", format_execution_event(&event)));

    println!();
    let Some(workflow) = engine.handle_event(&config, event).await? else {
        println!("{} Event does not trigger {}; nothing to do", INFO, style(&config.name).bold());
        return Ok(());
    };

    if !cmd.no_history {
        let store = open_store().await?;
        let summary = create_summary(&workflow);
        store.save_run(&summary).await?;
        println!(
            "\n{} Run saved to history (ID: {})",
            INFO,
            style(&summary.run_id.to_string()[..8]).dim()
        );
    }

    if workflow.state.status == ExecutionStatus::Completed {
        println!(
            "\n{} {} completed {}",
            CHECK,
            style(&workflow.name).bold(),
            style("successfully").green()
        );
        Ok(())
    } else {
        println!(
            "\n{} {} {}",
            CROSS,
            style(&workflow.name).bold(),
            style("failed").red()
        );
        error!("Workflow '{}' failed", workflow.name);
        std::process::exit(1);
    }
}

async fn ship(cmd: &ShipCommand) -> Result<()> {
    let files = collect_files(&cmd.folder)?;
    println!(
        "{} Found {} files in {}",
        INFO,
        style(files.len()).cyan(),
        cmd.folder.display()
    );

    let progress = create_progress_bar(files.len());
    progress.set_message("Processing files");
    let records = read_log_files(&files, Some(&progress));
    progress.finish_and_clear();
    info!("Read {} records from {} files", records.len(), files.len());

    let shipper = Shipper::new(cmd.host.clone(), cmd.port).with_max_attempts(cmd.max_attempts);
    let sent = shipper.send_with_retry(&records).await?;
    println!(
        "{} Sent {} records to {}",
        CHECK,
        style(sent).cyan(),
        style(shipper.address()).bold()
    );
    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_store().await?;

    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) if cmd.json => println!("{}", serde_json::to_string_pretty(&summary)?),
            Some(summary) => print_run_details(&summary),
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let runs = store.list_runs(cmd.workflow.as_deref(), cmd.limit).await?;

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for summary in &runs {
        println!("  {}", format_run_summary(summary));
    }

    Ok(())
}

fn print_run_details(summary: &RunSummary) {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Workflow: {}", style(&summary.workflow_name).bold());
    if let Some(repo) = &summary.repository {
        println!("  Repository: {}", repo);
    }
    println!("  Issue: #{}", summary.issue_number);
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Steps: {} completed, {} skipped, {} total",
        summary.steps_completed, summary.steps_skipped, summary.total_steps
    );
}

fn init(cmd: &InitCommand) -> Result<()> {
    std::fs::create_dir_all(&cmd.dir)
        .with_context(|| format!("Failed to create {}", cmd.dir.display()))?;

    for (name, contents) in [
        ("pipeline.yml", DEFAULT_PIPELINE_YAML),
        ("workflow.yml", DEFAULT_WORKFLOW_YAML),
    ] {
        let path = cmd.dir.join(name);
        if path.exists() && !cmd.force {
            println!("{} {} exists, skipping (use --force to overwrite)", WARN, path.display());
            continue;
        }
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{} Wrote {}", CHECK, path.display());
    }
    Ok(())
}

#[cfg(feature = "sqlite")]
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    Ok(Arc::new(SqliteRunStore::with_default_path().await?))
}

#[cfg(not(feature = "sqlite"))]
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    Ok(Arc::new(InMemoryPersistence::new()))
}
