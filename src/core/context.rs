//! Run context - event metadata and variables visible to a step

use crate::core::trigger::RepositoryEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Execution context for one step of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    /// Event that started the run
    pub event: RepositoryEvent,

    /// Pipeline variables and CLI overrides
    pub variables: HashMap<String, String>,

    /// The job being executed
    pub current_job_id: Option<String>,

    /// The step being executed
    pub current_step_id: Option<String>,

    /// Workspace the step runs in
    pub workspace: Option<PathBuf>,

    /// Metadata about the execution
    pub metadata: HashMap<String, String>,
}

impl RunContext {
    pub fn new(event: RepositoryEvent) -> Self {
        Self {
            event,
            variables: HashMap::new(),
            current_job_id: None,
            current_step_id: None,
            workspace: None,
            metadata: HashMap::new(),
        }
    }

    /// Variables available for command rendering
    ///
    /// Built-ins (`event`, `branch`, `job`, `step`, `workspace`) win over
    /// user variables of the same name.
    pub fn get_rendering_variables(&self) -> HashMap<String, String> {
        let mut vars = self.variables.clone();

        vars.insert("event".to_string(), self.event.kind.to_string());
        vars.insert("branch".to_string(), self.event.branch.clone());

        if let Some(ref job) = self.current_job_id {
            vars.insert("job".to_string(), job.clone());
        }
        if let Some(ref step) = self.current_step_id {
            vars.insert("step".to_string(), step.clone());
        }
        if let Some(ref workspace) = self.workspace {
            vars.insert("workspace".to_string(), workspace.display().to_string());
        }

        vars
    }
}
