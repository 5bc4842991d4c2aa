//! Pipeline configuration from YAML

use crate::core::trigger::BranchFilter;
use crate::core::{FailureKind, Pipeline};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Top-level pipeline manifest loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Trigger conditions (`on:` in the manifest)
    #[serde(rename = "on", default)]
    pub triggers: TriggerConfig,

    /// Variables rendered into step commands as `{{ name }}`
    #[serde(default)]
    variables: HashMap<String, Value>,

    /// Jobs, executed in declared order
    pub jobs: Vec<JobConfig>,
}

/// Trigger section of the manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default, deserialize_with = "present_section", skip_serializing_if = "Option::is_none")]
    pub push: Option<BranchesConfig>,

    #[serde(default, deserialize_with = "present_section", skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<BranchesConfig>,
}

/// A section written with no body (`push:`) means its default branches
fn present_section<'de, D>(deserializer: D) -> std::result::Result<Option<BranchesConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let section = Option::<BranchesConfig>::deserialize(deserializer)?;
    Ok(Some(section.unwrap_or_default()))
}

impl Default for TriggerConfig {
    /// Pushes to `main` and pull requests targeting `main`
    fn default() -> Self {
        Self {
            push: Some(BranchesConfig::default()),
            pull_request: Some(BranchesConfig::default()),
        }
    }
}

/// Branch filter list for one event kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchesConfig {
    #[serde(default = "default_branches")]
    pub branches: Vec<String>,
}

impl Default for BranchesConfig {
    fn default() -> Self {
        Self {
            branches: default_branches(),
        }
    }
}

fn default_branches() -> Vec<String> {
    vec!["main".to_string()]
}

/// Job configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Unique job identifier
    pub id: String,

    /// Human-readable job name
    #[serde(default)]
    pub name: Option<String>,

    /// Pinned language runtime
    #[serde(default)]
    pub runtime: Option<RuntimeConfig>,

    /// Copy the repository into the workspace before running steps
    #[serde(default = "default_checkout")]
    pub checkout: bool,

    /// Default timeout for steps (in seconds); absent means no timeout
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Environment inherited by every step of the job
    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,

    /// Steps, executed in declared order
    pub steps: Vec<StepConfig>,
}

fn default_checkout() -> bool {
    true
}

/// Runtime pin for a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Language name, e.g. "python"
    pub language: String,

    /// Declared version, e.g. "3.11"
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,

    /// Command printing the installed version (default: `<language> --version`)
    #[serde(default)]
    pub probe: Option<String>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step identifier, unique within its job
    pub id: String,

    /// Human-readable step name
    #[serde(default)]
    pub name: Option<String>,

    /// What the step does; decides the failure bucket
    #[serde(default)]
    pub kind: StepKind,

    /// Shell command line
    pub run: String,

    /// Step environment (overrides job environment)
    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,

    /// Timeout for this step (overrides job default)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Directory relative to the workspace root
    #[serde(default)]
    pub working_directory: Option<String>,
}

/// Kind of step
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Tool installation
    Setup,
    /// Dependency installation
    Install,
    /// Static analysis
    Lint,
    /// Automated tests
    Test,
    /// Anything else
    #[default]
    Custom,
}

impl StepKind {
    pub fn failure_kind(self) -> FailureKind {
        match self {
            StepKind::Setup => FailureKind::Setup,
            StepKind::Install => FailureKind::Install,
            StepKind::Lint => FailureKind::Lint,
            StepKind::Test => FailureKind::Test,
            StepKind::Custom => FailureKind::Step,
        }
    }
}

/// Environment value: literal or provider-managed secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    /// Literal value
    Plain(#[serde(deserialize_with = "scalar_string")] String),
    /// Value taken from the secret store at run start
    Secret { secret: String },
}

/// Accept any YAML scalar as a string (`version: 3.11` is a float otherwise)
fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    scalar_to_string(&value)
        .ok_or_else(|| serde::de::Error::custom("expected a string, number or boolean"))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            anyhow::bail!("Pipeline '{}' has no jobs", self.name);
        }

        let sections = [&self.triggers.push, &self.triggers.pull_request];
        for branches in sections.into_iter().flatten() {
            for branch in &branches.branches {
                BranchFilter::parse(branch)
                    .with_context(|| format!("Invalid branch filter '{}'", branch))?;
            }
        }

        let mut seen_jobs = HashSet::new();
        for job in &self.jobs {
            if !seen_jobs.insert(&job.id) {
                anyhow::bail!("Duplicate job ID: {}", job.id);
            }
            if job.steps.is_empty() {
                anyhow::bail!("Job '{}' has no steps", job.id);
            }
            if let Some(runtime) = &job.runtime {
                if runtime.version.trim().is_empty() {
                    anyhow::bail!("Job '{}' declares runtime '{}' without a version", job.id, runtime.language);
                }
            }

            let mut seen_steps = HashSet::new();
            for step in &job.steps {
                if !seen_steps.insert(&step.id) {
                    anyhow::bail!("Duplicate step ID '{}' in job '{}'", step.id, job.id);
                }
                if step.run.trim().is_empty() {
                    anyhow::bail!("Step '{}' in job '{}' has an empty run command", step.id, job.id);
                }
            }
        }

        Ok(())
    }

    /// Get variables as a string map
    pub fn variables_as_string_map(&self) -> HashMap<String, String> {
        self.variables
            .iter()
            .map(|(key, value)| {
                let rendered = scalar_to_string(value).unwrap_or_else(|| {
                    serde_yaml::to_string(value)
                        .unwrap_or_default()
                        .trim_end()
                        .to_string()
                });
                (key.clone(), rendered)
            })
            .collect()
    }

    /// Names of every secret referenced by the manifest
    pub fn secret_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .jobs
            .iter()
            .flat_map(|job| job.env.values().chain(job.steps.iter().flat_map(|s| s.env.values())))
            .filter_map(|value| match value {
                EnvValue::Secret { secret } => Some(secret.clone()),
                EnvValue::Plain(_) => None,
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Total number of steps across all jobs
    pub fn step_count(&self) -> usize {
        self.jobs.iter().map(|job| job.steps.len()).sum()
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Pipeline {
        Pipeline::from_config(self)
    }
}
