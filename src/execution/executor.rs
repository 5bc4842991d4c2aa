//! Step executor - runs individual steps through a command runner

use crate::{
    core::{config::EnvValue, RunContext, Step},
    execution::{
        output::OutputCallback,
        process::{CommandRunner, Invocation, ProcessError, ProcessOutput},
    },
    secrets::SecretValue,
};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Result of executing a step
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Process exited with status 0
    Success { output: ProcessOutput },
    /// Nonzero exit, spawn failure, timeout or unrenderable command
    Failed {
        error: String,
        exit_code: Option<i32>,
        output: String,
    },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success { .. })
    }

    fn failed(error: impl Into<String>) -> Self {
        StepOutcome::Failed {
            error: error.into(),
            exit_code: None,
            output: String::new(),
        }
    }
}

/// Executes a single step
pub struct StepExecutor<R> {
    runner: Arc<R>,
}

impl<R: CommandRunner> StepExecutor<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self { runner }
    }

    /// Execute a step and return the result
    ///
    /// `env` is the merged job and step environment; secret bindings are
    /// looked up in `secrets`.
    pub async fn execute(
        &self,
        step: &Step,
        env: &BTreeMap<String, EnvValue>,
        context: &RunContext,
        secrets: &HashMap<String, SecretValue>,
        callback: Option<&dyn OutputCallback>,
    ) -> StepOutcome {
        info!("Executing step: {}", step.id);

        let command = match step.render_command(&context.get_rendering_variables()) {
            Ok(command) => command,
            Err(e) => {
                error!("Step {} not started: {}", step.id, e);
                return StepOutcome::failed(e.to_string());
            }
        };
        debug!("Command for step {}: {}", step.id, command);

        let env = match resolve_env(env, secrets) {
            Ok(env) => env,
            Err(name) => {
                error!("Step {} not started: secret '{}' is not bound", step.id, name);
                return StepOutcome::failed(format!("secret '{}' is not bound", name));
            }
        };

        let workspace = context.workspace.clone().unwrap_or_else(|| PathBuf::from("."));
        let working_dir = match &step.working_directory {
            Some(dir) => workspace.join(dir),
            None => workspace,
        };

        let invocation = Invocation::new(step.id.clone(), command, working_dir)
            .with_env(env)
            .with_timeout(step.timeout_secs.map(Duration::from_secs));

        match self.runner.run(&invocation, callback).await {
            Ok(output) if output.success() => {
                info!("Step {} completed in {}ms", step.id, output.duration_ms);
                StepOutcome::Success { output }
            }
            Ok(output) => {
                error!("Step {} exited with code {}", step.id, output.exit_code);
                StepOutcome::Failed {
                    error: format!("exited with code {}", output.exit_code),
                    exit_code: Some(output.exit_code),
                    output: output.combined(),
                }
            }
            Err(ProcessError::Timeout { secs, stdout, stderr }) => {
                error!("Timeout for step {} after {}s", step.id, secs);
                StepOutcome::Failed {
                    error: format!("timed out after {} seconds", secs),
                    exit_code: None,
                    output: format!("{}{}", stdout, stderr),
                }
            }
            Err(e) => {
                error!("Step {} failed to run: {}", step.id, e);
                StepOutcome::failed(e.to_string())
            }
        }
    }
}

/// Flatten env bindings into plain values; returns the first unbound secret name
fn resolve_env(
    env: &BTreeMap<String, EnvValue>,
    secrets: &HashMap<String, SecretValue>,
) -> Result<BTreeMap<String, String>, String> {
    env.iter()
        .map(|(key, value)| match value {
            EnvValue::Plain(v) => Ok((key.clone(), v.clone())),
            EnvValue::Secret { secret } => secrets
                .get(secret)
                .map(|s| (key.clone(), s.expose().to_string()))
                .ok_or_else(|| secret.clone()),
        })
        .collect()
}
