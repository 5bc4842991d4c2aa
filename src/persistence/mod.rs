//! Persistence layer for pipeline execution history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

pub use crate::core::ExecutionStatus;
use crate::core::{EventKind, FailureKind, Pipeline, RepositoryEvent};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a pipeline execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Pipeline name
    pub pipeline_name: String,

    /// Event that was evaluated
    pub event: EventKind,

    /// Branch of the event
    pub branch: String,

    /// Execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: DateTime<Utc>,

    /// When execution completed (if complete)
    pub completed_at: Option<DateTime<Utc>>,

    /// Progress (0.0 to 1.0)
    pub progress: f64,

    /// Number of completed steps
    pub completed_steps: usize,

    /// Number of skipped steps
    pub skipped_steps: usize,

    /// Total number of steps
    pub total_steps: usize,

    /// First failing step as `job/step`
    pub failed_step: Option<String>,

    /// Failure bucket of the first failure
    pub failure_kind: Option<FailureKind>,

    /// Reason of the first failure, secrets already masked
    pub failure_message: Option<String>,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a pipeline execution
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()>;

    /// Load an execution by ID
    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>>;

    /// List all executions for a pipeline, newest first
    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>>;

    /// Latest executions across all pipelines, newest first
    async fn list_recent(&self, limit: usize) -> Result<Vec<ExecutionSummary>>;

    /// List all pipeline names
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    executions: RwLock<HashMap<Uuid, ExecutionSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sorted(&self, filter: impl Fn(&ExecutionSummary) -> bool) -> Vec<ExecutionSummary> {
        let execs = self.executions.read().await;
        let mut result: Vec<ExecutionSummary> = execs.values().filter(|e| filter(e)).cloned().collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        result
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        let mut execs = self.executions.write().await;
        execs.insert(execution.execution_id, execution.clone());
        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let execs = self.executions.read().await;
        Ok(execs.get(&execution_id).cloned())
    }

    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>> {
        Ok(self.sorted(|e| e.pipeline_name == pipeline_name).await)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ExecutionSummary>> {
        let mut result = self.sorted(|_| true).await;
        result.truncate(limit);
        Ok(result)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let execs = self.executions.read().await;
        let mut names: Vec<String> = execs.values().map(|e| e.pipeline_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a pipeline
pub fn create_summary(pipeline: &Pipeline, event: &RepositoryEvent) -> ExecutionSummary {
    let failure = pipeline.state.failure.as_ref();

    ExecutionSummary {
        execution_id: pipeline.state.execution_id,
        pipeline_name: pipeline.name.clone(),
        event: event.kind,
        branch: event.branch.clone(),
        status: pipeline.state.status,
        started_at: pipeline.state.started_at.unwrap_or_else(Utc::now),
        completed_at: pipeline.state.completed_at,
        progress: pipeline.state.progress(),
        completed_steps: pipeline.state.completed_steps,
        skipped_steps: pipeline.state.skipped_steps,
        total_steps: pipeline.total_steps(),
        failed_step: failure.map(|f| match &f.step_id {
            Some(step) => format!("{}/{}", f.job_id, step),
            None => f.job_id.clone(),
        }),
        failure_kind: failure.map(|f| f.kind),
        failure_message: failure.map(|f| f.message.clone()),
    }
}
