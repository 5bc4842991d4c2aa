use anyhow::{Context, Result};
use pipeline_runner::cli::commands::{HistoryCommand, ListCommand, RunCommand, TriggerCommand, ValidateCommand};
use pipeline_runner::cli::output::*;
use pipeline_runner::cli::terminal_output::TerminalOutputCallback;
use pipeline_runner::cli::{Cli, Command};
use pipeline_runner::core::config::PipelineConfig;
use pipeline_runner::core::{ExecutionStatus, Pipeline, StepState};
use pipeline_runner::execution::{ExecutionEngine, ExecutionEvent, ProvisionOptions, ShellRunner};
use pipeline_runner::persistence::{create_summary, ExecutionSummary, InMemoryPersistence, PersistenceBackend};
use pipeline_runner::secrets::EnvSecretStore;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Lines of a failing step's output shown after the run
const FAILURE_OUTPUT_LINES: usize = 40;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // RUST_LOG wins; otherwise -v picks the level
    let fallback = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &cli).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Trigger(cmd) => evaluate_trigger(cmd)?,
        Command::List(cmd) => list_pipelines(cmd, &cli).await?,
        Command::History(cmd) => show_history(cmd, &cli).await?,
    }

    Ok(())
}

async fn run_pipeline(cmd: &RunCommand, cli: &Cli) -> Result<()> {
    // Load pipeline config
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;
    let event = cmd.event.resolve().context("Failed to determine repository event")?;

    println!(
        "{} Loaded pipeline: {} ({} to {})",
        INFO,
        style(&config.name).bold(),
        event.kind,
        style(&event.branch).cyan()
    );

    // Create pipeline
    let mut pipeline = config.to_pipeline();

    // Apply variable overrides
    for (key, value) in &cmd.var {
        pipeline.variables.insert(key.clone(), value.clone());
        println!(
            "{} Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    // Set up persistence
    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        open_store(cli.db.as_deref()).await?
    };

    let options = ProvisionOptions {
        source_dir: cmd.source.clone(),
        in_place: cmd.in_place,
        keep_workspace: cmd.keep_workspace,
    };
    let mut engine = ExecutionEngine::new(ShellRunner::default(), Arc::new(EnvSecretStore::new()), options);

    // Live output when streaming, a progress bar otherwise
    let terminal = cli.stream.then(|| Arc::new(TerminalOutputCallback::new(true)));
    if let Some(terminal) = &terminal {
        engine = engine.with_output_callback(terminal.clone());
    }
    let progress = (!cli.stream).then(|| create_progress_bar(pipeline.total_steps()));

    let handler_progress = progress.clone();
    engine
        .add_event_handler(move |event| {
            if let Some(terminal) = &terminal {
                match &event {
                    ExecutionEvent::StepStarted { index, total, name, .. } => {
                        terminal.begin_step(*index, *total, name)
                    }
                    // Already streamed line by line
                    ExecutionEvent::StepOutput { .. } => {}
                    _ => println!("{}", format_execution_event(&event)),
                }
                return;
            }

            let Some(bar) = &handler_progress else {
                return;
            };
            match &event {
                ExecutionEvent::StepOutput { .. } => return,
                ExecutionEvent::StepStarted { step_id, .. } => bar.set_message(step_id.clone()),
                ExecutionEvent::StepCompleted { .. }
                | ExecutionEvent::StepFailed { .. }
                | ExecutionEvent::StepSkipped { .. } => bar.inc(1),
                _ => {}
            }
            bar.println(format_execution_event(&event));
        })
        .await;

    // Execute pipeline; Ctrl-C kills the running step
    println!();
    let outcome = tokio::select! {
        status = engine.execute(&mut pipeline, &event) => Some(status),
        _ = tokio::signal::ctrl_c() => None,
    };
    let status = match outcome {
        Some(status) => status,
        None => {
            warn!("Interrupted, cancelling run");
            pipeline.cancel();
            ExecutionStatus::Cancelled
        }
    };

    if let Some(bar) = &progress {
        bar.finish_and_clear();
    }

    // Save to history
    if !cmd.no_history {
        let summary = create_summary(&pipeline, &event);
        store.save_execution(&summary).await?;
        println!(
            "\n{} Execution saved to history (ID: {})",
            INFO,
            style(&summary.execution_id.to_string()[..8]).dim()
        );
    }

    // Print final status
    match status {
        ExecutionStatus::Completed => println!(
            "\n{} {} completed {}",
            CHECK,
            style(&pipeline.name).bold(),
            style("successfully").green()
        ),
        ExecutionStatus::Skipped => println!(
            "\n{} {} not triggered by {} to {}",
            SKIP,
            style(&pipeline.name).bold(),
            event.kind,
            event.branch
        ),
        _ => {
            if !cli.stream {
                print_failure_output(&pipeline);
            }
            let reason = pipeline
                .state
                .failure
                .as_ref()
                .map(|f| format!(" ({} in {}: {})", f.kind, f.step_id.as_deref().unwrap_or(&f.job_id), f.message))
                .unwrap_or_default();
            println!(
                "\n{} {} {}{}",
                CROSS,
                style(&pipeline.name).bold(),
                style(format!("{:?}", status).to_lowercase()).red(),
                reason
            );
            error!("Pipeline {} finished with status {:?}", pipeline.name, status);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Show the captured output of the failing step
fn print_failure_output(pipeline: &Pipeline) {
    let Some(failure) = &pipeline.state.failure else {
        return;
    };
    let Some(step_id) = &failure.step_id else {
        return;
    };
    if let Some(StepState::Failed { output, .. }) = pipeline.step(&failure.job_id, step_id).map(|s| &s.state) {
        if !output.trim().is_empty() {
            println!("\n{} Output of {}:", INFO, style(step_id).red());
            println!("{}", format_output(output, FAILURE_OUTPUT_LINES));
        }
    }
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Jobs: {}", style(config.jobs.len()).cyan());
            println!("  Steps: {}", style(config.step_count()).cyan());
            let secrets = config.secret_names();
            if !secrets.is_empty() {
                println!("  Secrets: {}", style(secrets.join(", ")).cyan());
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
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

fn evaluate_trigger(cmd: &TriggerCommand) -> Result<()> {
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;
    let event = cmd.event.resolve().context("Failed to determine repository event")?;
    let triggered = config.to_pipeline().should_run(&event);

    if cmd.json {
        let data = serde_json::json!({
            "pipeline": config.name,
            "event": event,
            "triggered": triggered,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else if triggered {
        println!(
            "{} {} runs for {} to {}",
            CHECK,
            style(&config.name).bold(),
            event.kind,
            style(&event.branch).cyan()
        );
    } else {
        println!(
            "{} {} does not run for {} to {}",
            SKIP,
            style(&config.name).bold(),
            event.kind,
            style(&event.branch).cyan()
        );
    }

    Ok(())
}

async fn list_pipelines(cmd: &ListCommand, cli: &Cli) -> Result<()> {
    let store = open_store(cli.db.as_deref()).await?;
    let pipelines = store.list_pipelines().await?;

    if pipelines.is_empty() {
        println!("{} No pipelines found in history", INFO);
        return Ok(());
    }

    if cmd.json {
        let mut json_data = Vec::new();
        for pipeline in &pipelines {
            let executions = store.list_executions(pipeline).await?;
            json_data.push(serde_json::json!({
                "name": pipeline,
                "execution_count": executions.len()
            }));
        }
        let data = serde_json::json!({ "pipelines": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{} Pipelines in history:", INFO);

    for pipeline_name in &pipelines {
        if cmd.with_counts {
            let executions = store.list_executions(pipeline_name).await?;
            let count = |status: ExecutionStatus| executions.iter().filter(|e| e.status == status).count();
            println!(
                "  {} ({} runs: {} succeeded, {} failed, {} skipped)",
                style(pipeline_name).bold(),
                style(executions.len()).cyan(),
                style(count(ExecutionStatus::Completed)).green(),
                style(count(ExecutionStatus::Failed)).red(),
                style(count(ExecutionStatus::Skipped)).dim()
            );
        } else {
            println!("  {}", style(pipeline_name).bold());
        }
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand, cli: &Cli) -> Result<()> {
    let store = open_store(cli.db.as_deref()).await?;

    // If specific execution ID is requested
    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id = uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;

        match store.load_execution(exec_id).await? {
            Some(summary) => print_execution_details(&summary, cmd.verbose)?,
            None => println!("{} Execution not found", WARN),
        }
        return Ok(());
    }

    let executions = match &cmd.pipeline {
        Some(pipeline_name) => {
            let mut execs = store.list_executions(pipeline_name).await?;
            execs.truncate(cmd.limit);
            execs
        }
        None => store.list_recent(cmd.limit).await?,
    };

    if executions.is_empty() {
        println!("{} No executions found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Execution history (showing latest {}):", INFO, cmd.limit);
        for summary in &executions {
            println!("  {}", format_execution_summary(summary));
        }
    }

    Ok(())
}

fn print_execution_details(summary: &ExecutionSummary, verbose: bool) -> Result<()> {
    println!("{} Execution Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Event: {} to {}", summary.event, style(&summary.branch).cyan());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Progress: {} ({}/{}, {} skipped)",
        style(format!("{:.0}%", summary.progress * 100.0)).cyan(),
        summary.completed_steps,
        summary.total_steps,
        summary.skipped_steps
    );
    if let (Some(step), Some(kind)) = (&summary.failed_step, summary.failure_kind) {
        println!("  Failure: {} in {}", style(kind).red(), style(step).bold());
    }
    if let Some(message) = &summary.failure_message {
        println!("  Reason: {}", style(message).dim());
    }

    if verbose {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}

#[cfg(feature = "sqlite")]
async fn open_store(db: Option<&Path>) -> Result<Arc<dyn PersistenceBackend>> {
    use pipeline_runner::persistence::SqliteExecutionStore;

    let store = match db {
        Some(path) => SqliteExecutionStore::new(path).await?,
        None => SqliteExecutionStore::with_default_path().await?,
    };
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_store(_db: Option<&Path>) -> Result<Arc<dyn PersistenceBackend>> {
    warn!("Built without the sqlite feature; history is not persisted");
    Ok(Arc::new(InMemoryPersistence::new()))
}
