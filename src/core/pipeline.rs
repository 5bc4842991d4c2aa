//! Pipeline domain model

use crate::core::{
    config::PipelineConfig,
    context::RunContext,
    job::Job,
    state::{ExecutionStatus, PipelineState, StepState},
    step::Step,
    trigger::{RepositoryEvent, Trigger},
};
use std::collections::HashMap;
use std::path::Path;

/// A pipeline definition plus the state of its current run
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// When the pipeline runs
    pub trigger: Trigger,

    /// Variables available to every step command
    pub variables: HashMap<String, String>,

    /// Jobs in declared order
    pub jobs: Vec<Job>,

    /// Execution state
    pub state: PipelineState,
}

impl Pipeline {
    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        Pipeline {
            name: config.name.clone(),
            trigger: Trigger::from_config(&config.triggers),
            variables: config.variables_as_string_map(),
            jobs: config.jobs.iter().map(Job::from_config).collect(),
            state: PipelineState::new(),
        }
    }

    /// Trigger evaluation
    pub fn should_run(&self, event: &RepositoryEvent) -> bool {
        self.trigger.should_run(event)
    }

    /// Get a job by ID
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Get a mutable job by ID
    pub fn job_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    /// Get a step by job and step ID
    pub fn step(&self, job_id: &str, step_id: &str) -> Option<&Step> {
        self.job(job_id).and_then(|j| j.step(step_id))
    }

    /// Total number of steps across jobs
    pub fn total_steps(&self) -> usize {
        self.jobs.iter().map(|j| j.steps.len()).sum()
    }

    /// Steps whose process was attempted, as (job, step), in declared order
    pub fn attempted_steps(&self) -> Vec<(&str, &str)> {
        self.jobs
            .iter()
            .flat_map(|job| {
                job.steps
                    .iter()
                    .filter(|s| s.state.was_attempted())
                    .map(move |s| (job.id.as_str(), s.id.as_str()))
            })
            .collect()
    }

    /// Check if every step reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.jobs.iter().all(Job::is_complete)
    }

    /// Recount step states into the run state
    pub fn update_counts(&mut self) {
        let (mut completed, mut failed, mut skipped) = (0, 0, 0);
        for step in self.jobs.iter().flat_map(|j| j.steps.iter()) {
            match step.state {
                StepState::Completed { .. } => completed += 1,
                StepState::Failed { .. } => failed += 1,
                StepState::Skipped { .. } => skipped += 1,
                _ => {}
            }
        }
        self.state.update_counts(completed, failed, skipped);
    }

    /// Record an interrupted run
    ///
    /// A step that was running counts as failed, everything not yet reached
    /// as skipped.
    pub fn cancel(&mut self) {
        let now = chrono::Utc::now();
        for job in &mut self.jobs {
            for step in &mut job.steps {
                if let StepState::Running { started_at } = step.state {
                    step.state = StepState::Failed {
                        error: "cancelled".to_string(),
                        exit_code: None,
                        output: String::new(),
                        started_at,
                        failed_at: now,
                    };
                }
            }
            job.skip_pending("run cancelled");
            if matches!(job.status, ExecutionStatus::Pending | ExecutionStatus::Running) {
                job.status = ExecutionStatus::Cancelled;
            }
        }
        self.update_counts();
        self.state.cancel();
    }

    /// Create execution context for a step
    pub fn create_context_for_step(
        &self,
        job_id: &str,
        step_id: &str,
        event: &RepositoryEvent,
        workspace: &Path,
    ) -> RunContext {
        let mut context = RunContext::new(event.clone());
        context.variables.extend(self.variables.clone());
        context.current_job_id = Some(job_id.to_string());
        context.current_step_id = Some(step_id.to_string());
        context.workspace = Some(workspace.to_path_buf());
        context
            .metadata
            .insert("execution_id".to_string(), self.state.execution_id.to_string());
        context
    }
}
