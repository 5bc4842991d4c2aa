//! Command-line interface

pub mod commands;
pub mod output;
pub mod terminal_output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, ListCommand, RunCommand, TriggerCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// CI pipeline runner
#[derive(Debug, Parser, Clone)]
#[command(name = "pipeline-runner")]
#[command(author = "Pipeline Runner Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Runs install, lint and test pipelines for repository events", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Stream step output live
    #[arg(short, long, global = true)]
    pub stream: bool,

    /// Execution history database
    #[arg(long, global = true, env = "PIPELINE_RUNNER_DB")]
    pub db: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline for a repository event
    Run(RunCommand),

    /// Validate a pipeline manifest
    Validate(ValidateCommand),

    /// Check whether an event triggers a pipeline
    Trigger(TriggerCommand),

    /// List pipelines in history
    List(ListCommand),

    /// Show execution history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
