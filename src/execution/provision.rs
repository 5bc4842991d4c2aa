//! Environment provisioning: workspace, checkout, runtime pin, secret binding

use crate::core::{Job, RuntimeRequirement};
use crate::execution::process::{CommandRunner, Invocation};
use crate::secrets::{SecretError, SecretStore, SecretValue};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info};

/// Directories never copied into a workspace
const CHECKOUT_EXCLUDES: &[&str] = &[".git", "target"];

/// Upper bound for a runtime probe
const PROBE_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to create workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("failed to check out {}: {source}", .path.display())]
    Checkout {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("runtime probe `{command}` failed: {reason}")]
    ProbeFailed { command: String, reason: String },

    #[error("runtime probe `{command}` printed no version number")]
    VersionNotFound { command: String },

    #[error("{language} {installed} does not satisfy pinned version {declared}")]
    RuntimeMismatch {
        language: String,
        declared: String,
        installed: String,
    },

    #[error(transparent)]
    Secret(#[from] SecretError),
}

/// Where and how jobs are provisioned
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Repository contents to materialize
    pub source_dir: PathBuf,

    /// Run directly in `source_dir` instead of a copy
    pub in_place: bool,

    /// Leave the ephemeral workspace on disk after the job
    pub keep_workspace: bool,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            in_place: false,
            keep_workspace: false,
        }
    }
}

/// Directory a job's steps run in
#[derive(Debug)]
pub enum Workspace {
    /// Removed on drop
    Ephemeral(TempDir),
    /// Copied workspace left on disk
    Kept(PathBuf),
    /// The source directory itself
    InPlace(PathBuf),
}

impl Workspace {
    pub fn path(&self) -> &Path {
        match self {
            Workspace::Ephemeral(dir) => dir.path(),
            Workspace::Kept(path) | Workspace::InPlace(path) => path,
        }
    }
}

/// A job ready to run its steps
#[derive(Debug)]
pub struct ProvisionedJob {
    pub workspace: Workspace,

    /// Installed runtime version, when the job pins one
    pub runtime_version: Option<String>,

    /// Secrets bound for the job, by secret name
    pub secrets: HashMap<String, SecretValue>,
}

/// Prepares the execution environment of a job
pub struct Provisioner<'a, R: ?Sized> {
    runner: &'a R,
    secrets: &'a dyn SecretStore,
    options: &'a ProvisionOptions,
}

impl<'a, R: CommandRunner + ?Sized> Provisioner<'a, R> {
    pub fn new(runner: &'a R, secrets: &'a dyn SecretStore, options: &'a ProvisionOptions) -> Self {
        Self {
            runner,
            secrets,
            options,
        }
    }

    /// Provision a job; any error here means no step of the job may run
    pub async fn provision(&self, job: &Job) -> Result<ProvisionedJob, ProvisionError> {
        let secrets = self.secrets.resolve(&job.id, &job.secret_names())?;

        let workspace = self.prepare_workspace(job).await?;
        info!("Job {} workspace: {}", job.id, workspace.path().display());

        let runtime_version = match &job.runtime {
            Some(runtime) => Some(self.check_runtime(runtime, workspace.path()).await?),
            None => None,
        };

        Ok(ProvisionedJob {
            workspace,
            runtime_version,
            secrets,
        })
    }

    async fn prepare_workspace(&self, job: &Job) -> Result<Workspace, ProvisionError> {
        let source = self.options.source_dir.clone();
        if self.options.in_place || !job.checkout {
            return Ok(Workspace::InPlace(source));
        }

        let dir = tempfile::Builder::new()
            .prefix(&format!("pipeline-runner-{}-", job.id))
            .tempdir()
            .map_err(ProvisionError::Workspace)?;

        let target = dir.path().to_path_buf();
        let copy_source = source.clone();
        tokio::task::spawn_blocking(move || copy_tree(&copy_source, &target))
            .await
            .map_err(|e| ProvisionError::Checkout {
                path: source.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?
            .map_err(|e| ProvisionError::Checkout {
                path: source.clone(),
                source: e,
            })?;

        if self.options.keep_workspace {
            Ok(Workspace::Kept(dir.keep()))
        } else {
            Ok(Workspace::Ephemeral(dir))
        }
    }

    async fn check_runtime(
        &self,
        runtime: &RuntimeRequirement,
        workdir: &Path,
    ) -> Result<String, ProvisionError> {
        let command = runtime.probe_command();
        let invocation = Invocation::new(format!("{}-probe", runtime.language), command.clone(), workdir)
            .with_timeout(Some(Duration::from_secs(PROBE_TIMEOUT_SECS)));

        let output = self
            .runner
            .run(&invocation, None)
            .await
            .map_err(|e| ProvisionError::ProbeFailed {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if !output.success() {
            return Err(ProvisionError::ProbeFailed {
                command,
                reason: format!("exit code {}", output.exit_code),
            });
        }

        // Some runtimes print their version on stderr
        let installed = extract_version(&output.combined())
            .ok_or_else(|| ProvisionError::VersionNotFound { command: command.clone() })?;
        debug!("{} probe reported {}", runtime.language, installed);

        if runtime.accepts(&installed) {
            Ok(installed)
        } else {
            Err(ProvisionError::RuntimeMismatch {
                language: runtime.language.clone(),
                declared: runtime.version.clone(),
                installed,
            })
        }
    }
}

/// First dotted version number in probe output
pub fn extract_version(text: &str) -> Option<String> {
    static VERSION: OnceLock<Regex> = OnceLock::new();
    let regex = VERSION.get_or_init(|| Regex::new(r"\d+(?:\.\d+)+").expect("version regex is valid"));
    regex.find(text).map(|m| m.as_str().to_string())
}

/// Recursively copy `source` into `target`, skipping [`CHECKOUT_EXCLUDES`]
fn copy_tree(source: &Path, target: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let name = entry.file_name();
        if CHECKOUT_EXCLUDES.iter().any(|excluded| name == *excluded) {
            continue;
        }

        let from = entry.path();
        let to = target.join(&name);
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            std::fs::create_dir_all(&to)?;
            copy_tree(&from, &to)?;
        } else if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(std::fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::copy(from, to).map(|_| ())
}
