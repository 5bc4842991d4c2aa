//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Overall run (and job) execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Run has not started
    Pending,
    /// Run is currently executing
    Running,
    /// Every step exited with status 0
    Completed,
    /// A step (or provisioning) failed
    Failed,
    /// The event did not match any trigger
    Skipped,
    /// Run was interrupted before it finished
    Cancelled,
}

impl ExecutionStatus {
    /// Parse the `Debug` form stored by the history backends
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Pending" => Some(ExecutionStatus::Pending),
            "Running" => Some(ExecutionStatus::Running),
            "Completed" => Some(ExecutionStatus::Completed),
            "Failed" => Some(ExecutionStatus::Failed),
            "Skipped" => Some(ExecutionStatus::Skipped),
            "Cancelled" => Some(ExecutionStatus::Cancelled),
            _ => None,
        }
    }
}

/// Coarse failure taxonomy, one bucket per phase of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Workspace, checkout, runtime pin or secret binding failed
    Provisioning,
    /// A tool setup step failed
    Setup,
    /// The dependency install step failed
    Install,
    /// The lint step failed
    Lint,
    /// The test step failed
    Test,
    /// Any other step failed
    Step,
}

impl FailureKind {
    /// Stable identifier, matching the serde form
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Provisioning => "provisioning",
            FailureKind::Setup => "setup",
            FailureKind::Install => "install",
            FailureKind::Lint => "lint",
            FailureKind::Test => "test",
            FailureKind::Step => "step",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            FailureKind::Provisioning,
            FailureKind::Setup,
            FailureKind::Install,
            FailureKind::Lint,
            FailureKind::Test,
            FailureKind::Step,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Provisioning => "provisioning",
            FailureKind::Setup => "setup",
            FailureKind::Install => "dependency install",
            FailureKind::Lint => "lint",
            FailureKind::Test => "test",
            FailureKind::Step => "step",
        };
        write!(f, "{} failure", name)
    }
}

/// The first failure of a run; it decides the run's overall status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// Job the failure happened in
    pub job_id: String,

    /// Failing step (None for provisioning failures)
    pub step_id: Option<String>,

    /// Failure bucket
    pub kind: FailureKind,

    /// Process exit code, when a process actually ran
    pub exit_code: Option<i32>,

    /// Human-readable reason
    pub message: String,
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not been reached yet
    Pending,
    /// Step process is running
    Running {
        started_at: DateTime<Utc>,
    },
    /// Step process exited with status 0
    Completed {
        output: String,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Step failed: nonzero exit, spawn error, timeout or rendering error
    Failed {
        error: String,
        exit_code: Option<i32>,
        output: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Step never ran because an earlier failure aborted the job
    Skipped {
        reason: String,
    },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed { .. } | StepState::Failed { .. } | StepState::Skipped { .. }
        )
    }

    /// Whether the step's process was actually attempted
    pub fn was_attempted(&self) -> bool {
        matches!(
            self,
            StepState::Running { .. } | StepState::Completed { .. } | StepState::Failed { .. }
        )
    }
}

/// Overall run state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution completed/failed
    pub completed_at: Option<DateTime<Utc>>,

    /// Total number of steps across all jobs
    pub total_steps: usize,

    /// Number of completed steps
    pub completed_steps: usize,

    /// Number of failed steps
    pub failed_steps: usize,

    /// Number of skipped steps
    pub skipped_steps: usize,

    /// First failure, if any
    pub failure: Option<RunFailure>,
}

impl PipelineState {
    /// Create a new pipeline state
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            total_steps: 0,
            completed_steps: 0,
            failed_steps: 0,
            skipped_steps: 0,
            failure: None,
        }
    }

    /// Mark run as started
    pub fn start(&mut self, total_steps: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_steps = total_steps;
    }

    /// Mark run as completed
    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark run as failed; only the first failure is kept
    pub fn fail(&mut self, failure: RunFailure) {
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
        if self.failure.is_none() {
            self.failure = Some(failure);
        }
    }

    /// Mark run as not triggered
    pub fn skip(&mut self) {
        let now = Utc::now();
        self.status = ExecutionStatus::Skipped;
        self.started_at.get_or_insert(now);
        self.completed_at = Some(now);
    }

    /// Mark run as cancelled
    pub fn cancel(&mut self) {
        self.status = ExecutionStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    /// Update step counts
    pub fn update_counts(&mut self, completed: usize, failed: usize, skipped: usize) {
        self.completed_steps = completed;
        self.failed_steps = failed;
        self.skipped_steps = skipped;
    }

    /// Calculate progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        (self.completed_steps + self.failed_steps + self.skipped_steps) as f64
            / self.total_steps as f64
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
