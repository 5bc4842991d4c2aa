//! Step domain model

use crate::core::config::{EnvValue, StepConfig, StepKind};
use crate::core::state::StepState;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use thiserror::Error;

/// A single external command invocation within a job
#[derive(Debug, Clone)]
pub struct Step {
    /// Step identifier, unique within its job
    pub id: String,

    /// Display name
    pub name: String,

    /// What the step does
    pub kind: StepKind,

    /// Command line template (`{{ name }}` placeholders)
    pub command_template: String,

    /// Step-level environment bindings
    pub env: BTreeMap<String, EnvValue>,

    /// Timeout in seconds (None = run until exit)
    pub timeout_secs: Option<u64>,

    /// Directory relative to the workspace root
    pub working_directory: Option<String>,

    /// Runtime state
    pub state: StepState,
}

/// Command rendering failure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("unresolved placeholder(s): {}", .0.join(", "))]
    Unresolved(Vec<String>),
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder regex is valid")
    })
}

impl Step {
    /// Create a step from a step config
    pub fn from_config(config: &StepConfig, defaults: &StepDefaults) -> Self {
        Step {
            id: config.id.clone(),
            name: config.name.clone().unwrap_or_else(|| config.id.clone()),
            kind: config.kind,
            command_template: config.run.clone(),
            env: config.env.clone(),
            timeout_secs: config.timeout_secs.or(defaults.timeout_secs),
            working_directory: config.working_directory.clone(),
            state: StepState::Pending,
        }
    }

    /// Render the command with variable substitution
    ///
    /// Unknown placeholders are an error; nothing is spawned for a command
    /// that still carries one.
    pub fn render_command(&self, variables: &HashMap<String, String>) -> Result<String, RenderError> {
        let mut missing = Vec::new();

        let rendered = placeholder_regex().replace_all(&self.command_template, |caps: &Captures| {
            let key = &caps[1];
            match variables.get(key) {
                Some(value) => value.clone(),
                None => {
                    missing.push(key.to_string());
                    caps[0].to_string()
                }
            }
        });

        if missing.is_empty() {
            Ok(rendered.into_owned())
        } else {
            missing.sort();
            missing.dedup();
            Err(RenderError::Unresolved(missing))
        }
    }

    /// Names of secrets bound by this step
    pub fn secret_names(&self) -> impl Iterator<Item = &str> {
        self.env.values().filter_map(|value| match value {
            EnvValue::Secret { secret } => Some(secret.as_str()),
            EnvValue::Plain(_) => None,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct StepDefaults {
    pub timeout_secs: Option<u64>,
}
