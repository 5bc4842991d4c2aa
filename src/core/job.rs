//! Job domain model

use crate::core::config::{EnvValue, JobConfig, RuntimeConfig};
use crate::core::state::{ExecutionStatus, StepState};
use crate::core::step::{Step, StepDefaults};
use std::collections::BTreeMap;

/// Named collection of ordered steps sharing one provisioned environment
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique job identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Pinned language runtime
    pub runtime: Option<RuntimeRequirement>,

    /// Copy the repository into the workspace first
    pub checkout: bool,

    /// Environment inherited by every step
    pub env: BTreeMap<String, EnvValue>,

    /// Steps in declared order
    pub steps: Vec<Step>,

    /// Job status
    pub status: ExecutionStatus,
}

/// Runtime a job must be provisioned with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeRequirement {
    pub language: String,
    pub version: String,
    probe: Option<String>,
}

impl RuntimeRequirement {
    pub fn new(language: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            version: version.into(),
            probe: None,
        }
    }

    pub fn with_probe(mut self, probe: impl Into<String>) -> Self {
        self.probe = Some(probe.into());
        self
    }

    fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            language: config.language.clone(),
            version: config.version.trim().to_string(),
            probe: config.probe.clone(),
        }
    }

    /// Command printing the installed version
    pub fn probe_command(&self) -> String {
        self.probe
            .clone()
            .unwrap_or_else(|| format!("{} --version", self.language))
    }

    /// Component-prefix match: "3.11" accepts "3.11" and "3.11.4", rejects "3.1" and "3.12.0"
    pub fn accepts(&self, installed: &str) -> bool {
        let declared: Vec<&str> = self.version.split('.').collect();
        let installed: Vec<&str> = installed.trim().split('.').collect();

        declared.len() <= installed.len()
            && declared.iter().zip(&installed).all(|(d, i)| d == i)
    }
}

impl Job {
    /// Create a job from configuration
    pub fn from_config(config: &JobConfig) -> Self {
        let defaults = StepDefaults {
            timeout_secs: config.timeout_secs,
        };

        Job {
            id: config.id.clone(),
            name: config.name.clone().unwrap_or_else(|| config.id.clone()),
            runtime: config.runtime.as_ref().map(RuntimeRequirement::from_config),
            checkout: config.checkout,
            env: config.env.clone(),
            steps: config
                .steps
                .iter()
                .map(|s| Step::from_config(s, &defaults))
                .collect(),
            status: ExecutionStatus::Pending,
        }
    }

    /// Get a step by ID
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Get a mutable step by ID
    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// Job env overlaid with the step's env
    pub fn env_for_step(&self, step: &Step) -> BTreeMap<String, EnvValue> {
        let mut env = self.env.clone();
        env.extend(step.env.clone());
        env
    }

    /// Every secret the job and its steps bind
    pub fn secret_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .env
            .values()
            .filter_map(|value| match value {
                EnvValue::Secret { secret } => Some(secret.clone()),
                EnvValue::Plain(_) => None,
            })
            .chain(
                self.steps
                    .iter()
                    .flat_map(|s| s.secret_names().map(str::to_string)),
            )
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Mark every step that has not run as skipped
    pub fn skip_pending(&mut self, reason: &str) {
        for step in &mut self.steps {
            if matches!(step.state, StepState::Pending) {
                step.state = StepState::Skipped {
                    reason: reason.to_string(),
                };
            }
        }
    }

    /// Whether every step reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.state.is_terminal())
    }
}
