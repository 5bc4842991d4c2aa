//! CLI command definitions

use crate::core::{EventKind, RepositoryEvent, TriggerError};
use clap::Args;
use std::path::PathBuf;

/// Repository event selection shared by `run` and `trigger`
#[derive(Debug, Args, Clone)]
pub struct EventArgs {
    /// Event type
    #[arg(long = "event", value_enum, default_value_t = EventKindArg::Push)]
    pub kind: EventKindArg,

    /// Pushed branch, or target branch of a pull request
    #[arg(long, required_unless_present = "from_env")]
    pub branch: Option<String>,

    /// Read the event from CI provider variables (GITHUB_EVENT_NAME, GITHUB_BASE_REF, GITHUB_REF_NAME)
    #[arg(long, conflicts_with = "branch")]
    pub from_env: bool,
}

impl EventArgs {
    /// Build the repository event these arguments describe
    pub fn resolve(&self) -> Result<RepositoryEvent, TriggerError> {
        if self.from_env {
            return RepositoryEvent::from_env();
        }
        let branch = self
            .branch
            .clone()
            .ok_or(TriggerError::MissingVariable("--branch"))?;
        Ok(RepositoryEvent::new(self.kind.into(), branch))
    }
}

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    #[command(flatten)]
    pub event: EventArgs,

    /// Repository checkout to build
    #[arg(long, default_value = ".")]
    pub source: PathBuf,

    /// Run in the source directory instead of an ephemeral copy
    #[arg(long)]
    pub in_place: bool,

    /// Keep the ephemeral workspace after the run
    #[arg(long)]
    pub keep_workspace: bool,

    /// Variable overrides (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub var: Vec<(String, String)>,

    /// Don't save execution to history
    #[arg(long)]
    pub no_history: bool,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Evaluate triggers without running anything
#[derive(Debug, Args, Clone)]
pub struct TriggerCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    #[command(flatten)]
    pub event: EventArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List available pipelines
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show execution counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show executions for a specific execution ID
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Event type argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EventKindArg {
    Push,
    #[clap(name = "pull-request", alias = "pull_request")]
    PullRequest,
    Tag,
    Schedule,
    Manual,
}

impl From<EventKindArg> for EventKind {
    fn from(arg: EventKindArg) -> Self {
        match arg {
            EventKindArg::Push => EventKind::Push,
            EventKindArg::PullRequest => EventKind::PullRequest,
            EventKindArg::Tag => EventKind::Tag,
            EventKindArg::Schedule => EventKind::Schedule,
            EventKindArg::Manual => EventKind::Manual,
        }
    }
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
