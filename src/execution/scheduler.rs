//! Execution scheduler - determines which job and step run next

use crate::core::{ExecutionStatus, Job, Pipeline, StepState};

/// Fail-fast, declared-order scheduler
///
/// Jobs run one at a time in manifest order and so do the steps inside a
/// job. Once anything has failed nothing else is handed out.
#[derive(Debug, Clone, Default)]
pub struct ExecutionScheduler;

impl ExecutionScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Index of the next job to run
    pub fn next_job(&self, pipeline: &Pipeline) -> Option<usize> {
        if pipeline
            .jobs
            .iter()
            .any(|j| matches!(j.status, ExecutionStatus::Failed | ExecutionStatus::Cancelled))
        {
            return None;
        }

        pipeline
            .jobs
            .iter()
            .position(|j| j.status == ExecutionStatus::Pending)
    }

    /// Index of the next step to run within a job
    pub fn next_step(&self, job: &Job) -> Option<usize> {
        if job
            .steps
            .iter()
            .any(|s| matches!(s.state, StepState::Failed { .. }))
        {
            return None;
        }

        job.steps
            .iter()
            .position(|s| matches!(s.state, StepState::Pending))
    }
}
