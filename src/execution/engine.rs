//! Main execution engine - orchestrates the entire pipeline run

use crate::{
    core::{ExecutionStatus, FailureKind, Job, Pipeline, RepositoryEvent, RunFailure, StepState},
    execution::{
        output::{OutputCallback, RedactingCallback},
        process::CommandRunner,
        provision::{ProvisionOptions, Provisioner, Workspace},
        ExecutionScheduler, StepExecutor, StepOutcome,
    },
    secrets::{Redactor, SecretStore},
};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
    },
    /// The event matched no trigger; nothing was provisioned
    PipelineSkipped {
        execution_id: Uuid,
        reason: String,
    },
    JobStarted {
        job_id: String,
        name: String,
    },
    JobProvisioned {
        job_id: String,
        workspace: PathBuf,
        runtime_version: Option<String>,
    },
    ProvisioningFailed {
        job_id: String,
        error: String,
    },
    StepStarted {
        job_id: String,
        step_id: String,
        name: String,
        index: usize,
        total: usize,
    },
    StepOutput {
        job_id: String,
        step_id: String,
        output: String,
    },
    StepCompleted {
        job_id: String,
        step_id: String,
        duration_ms: u64,
    },
    StepFailed {
        job_id: String,
        step_id: String,
        kind: FailureKind,
        exit_code: Option<i32>,
        error: String,
    },
    StepSkipped {
        job_id: String,
        step_id: String,
        reason: String,
    },
    JobFinished {
        job_id: String,
        status: ExecutionStatus,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Main pipeline execution engine
pub struct ExecutionEngine<R> {
    runner: Arc<R>,
    executor: StepExecutor<R>,
    scheduler: ExecutionScheduler,
    secrets: Arc<dyn SecretStore>,
    options: ProvisionOptions,
    output: Option<Arc<dyn OutputCallback>>,
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl<R: CommandRunner + 'static> ExecutionEngine<R> {
    pub fn new(runner: R, secrets: Arc<dyn SecretStore>, options: ProvisionOptions) -> Self {
        let runner = Arc::new(runner);

        Self {
            executor: StepExecutor::new(runner.clone()),
            runner,
            scheduler: ExecutionScheduler::new(),
            secrets,
            options,
            output: None,
            event_handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Stream step output lines to `callback`, with secrets masked
    pub fn with_output_callback(mut self, callback: Arc<dyn OutputCallback>) -> Self {
        self.output = Some(callback);
        self
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    async fn emit_event(&self, event: ExecutionEvent) {
        let handlers = self.event_handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Execute the entire pipeline for one repository event
    ///
    /// Returns the overall status: `Skipped` when no trigger matched,
    /// `Failed` as soon as any job fails (later jobs are skipped), and
    /// `Completed` when every step exited with status 0.
    pub async fn execute(&self, pipeline: &mut Pipeline, event: &RepositoryEvent) -> ExecutionStatus {
        let execution_id = pipeline.state.execution_id;

        info!(
            "Starting pipeline execution: {} ({}) for {} on {}",
            pipeline.name, execution_id, event.kind, event.branch
        );
        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline.name.clone(),
        })
        .await;

        if !pipeline.should_run(event) {
            let reason = format!("{} to '{}' matches no trigger", event.kind, event.branch);
            info!("Pipeline {} skipped: {}", pipeline.name, reason);

            for job in &mut pipeline.jobs {
                job.status = ExecutionStatus::Skipped;
                job.skip_pending("not triggered");
            }
            pipeline.update_counts();
            pipeline.state.skip();

            self.emit_event(ExecutionEvent::PipelineSkipped {
                execution_id,
                reason,
            })
            .await;
            self.emit_event(ExecutionEvent::PipelineCompleted {
                execution_id,
                status: ExecutionStatus::Skipped,
            })
            .await;
            return ExecutionStatus::Skipped;
        }

        pipeline.state.start(pipeline.total_steps());

        while let Some(index) = self.scheduler.next_job(pipeline) {
            self.execute_job(pipeline, index, event).await;
            pipeline.update_counts();
        }

        // Fail-fast across jobs
        if let Some(failed) = pipeline
            .jobs
            .iter()
            .find(|j| j.status == ExecutionStatus::Failed)
            .map(|j| j.id.clone())
        {
            let reason = format!("job '{}' failed", failed);
            for job in &mut pipeline.jobs {
                if job.status == ExecutionStatus::Pending {
                    job.status = ExecutionStatus::Skipped;
                    self.skip_remaining(job, &reason).await;
                }
            }
        }

        pipeline.update_counts();
        if pipeline.state.failure.is_none() {
            pipeline.state.complete();
        }

        let status = pipeline.state.status;
        info!("Pipeline execution finished: {} - {:?}", pipeline.name, status);
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        })
        .await;

        status
    }

    /// Provision a job and run its steps until one fails
    async fn execute_job(&self, pipeline: &mut Pipeline, index: usize, event: &RepositoryEvent) {
        let (job_id, job_name) = {
            let job = &mut pipeline.jobs[index];
            job.status = ExecutionStatus::Running;
            (job.id.clone(), job.name.clone())
        };

        info!("Starting job: {}", job_id);
        self.emit_event(ExecutionEvent::JobStarted {
            job_id: job_id.clone(),
            name: job_name,
        })
        .await;

        let provisioner = Provisioner::new(self.runner.as_ref(), self.secrets.as_ref(), &self.options);
        let provisioned = match provisioner.provision(&pipeline.jobs[index]).await {
            Ok(provisioned) => provisioned,
            Err(e) => {
                let message = e.to_string();
                error!("Provisioning of job {} failed: {}", job_id, message);

                pipeline.state.fail(RunFailure {
                    job_id: job_id.clone(),
                    step_id: None,
                    kind: FailureKind::Provisioning,
                    exit_code: None,
                    message: message.clone(),
                });
                self.emit_event(ExecutionEvent::ProvisioningFailed {
                    job_id: job_id.clone(),
                    error: message,
                })
                .await;

                let job = &mut pipeline.jobs[index];
                job.status = ExecutionStatus::Failed;
                self.skip_remaining(job, "provisioning failed").await;
                self.emit_event(ExecutionEvent::JobFinished {
                    job_id,
                    status: ExecutionStatus::Failed,
                })
                .await;
                return;
            }
        };

        let workspace = provisioned.workspace.path().to_path_buf();
        self.emit_event(ExecutionEvent::JobProvisioned {
            job_id: job_id.clone(),
            workspace: workspace.clone(),
            runtime_version: provisioned.runtime_version.clone(),
        })
        .await;

        let redactor = Redactor::new(provisioned.secrets.values());
        let callback = self
            .output
            .as_ref()
            .map(|inner| RedactingCallback::new(inner.clone(), redactor.clone()));

        let total = pipeline.jobs[index].steps.len();
        while let Some(step_index) = self.scheduler.next_step(&pipeline.jobs[index]) {
            let job = &pipeline.jobs[index];
            let step = job.steps[step_index].clone();
            let env = job.env_for_step(&step);
            let context = pipeline.create_context_for_step(&job_id, &step.id, event, &workspace);

            let started_at = Utc::now();
            pipeline.jobs[index].steps[step_index].state = StepState::Running { started_at };
            self.emit_event(ExecutionEvent::StepStarted {
                job_id: job_id.clone(),
                step_id: step.id.clone(),
                name: step.name.clone(),
                index: step_index + 1,
                total,
            })
            .await;

            let outcome = self
                .executor
                .execute(
                    &step,
                    &env,
                    &context,
                    &provisioned.secrets,
                    callback.as_ref().map(|c| c as &dyn OutputCallback),
                )
                .await;

            match outcome {
                StepOutcome::Success { output } => {
                    let text = redactor.redact(&output.combined());
                    pipeline.jobs[index].steps[step_index].state = StepState::Completed {
                        output: text.clone(),
                        started_at,
                        completed_at: Utc::now(),
                    };

                    if !text.is_empty() {
                        self.emit_event(ExecutionEvent::StepOutput {
                            job_id: job_id.clone(),
                            step_id: step.id.clone(),
                            output: text,
                        })
                        .await;
                    }
                    self.emit_event(ExecutionEvent::StepCompleted {
                        job_id: job_id.clone(),
                        step_id: step.id.clone(),
                        duration_ms: output.duration_ms,
                    })
                    .await;
                }
                StepOutcome::Failed {
                    error,
                    exit_code,
                    output,
                } => {
                    let error = redactor.redact(&error);
                    let output = redactor.redact(&output);
                    let kind = step.kind.failure_kind();

                    pipeline.jobs[index].steps[step_index].state = StepState::Failed {
                        error: error.clone(),
                        exit_code,
                        output: output.clone(),
                        started_at,
                        failed_at: Utc::now(),
                    };
                    pipeline.state.fail(RunFailure {
                        job_id: job_id.clone(),
                        step_id: Some(step.id.clone()),
                        kind,
                        exit_code,
                        message: error.clone(),
                    });

                    if !output.is_empty() {
                        self.emit_event(ExecutionEvent::StepOutput {
                            job_id: job_id.clone(),
                            step_id: step.id.clone(),
                            output,
                        })
                        .await;
                    }
                    self.emit_event(ExecutionEvent::StepFailed {
                        job_id: job_id.clone(),
                        step_id: step.id.clone(),
                        kind,
                        exit_code,
                        error,
                    })
                    .await;

                    let job = &mut pipeline.jobs[index];
                    job.status = ExecutionStatus::Failed;
                    self.skip_remaining(job, &format!("step '{}' failed", step.id)).await;
                }
            }
        }

        let job = &mut pipeline.jobs[index];
        if job.status == ExecutionStatus::Running {
            job.status = ExecutionStatus::Completed;
        }

        match &provisioned.workspace {
            Workspace::Kept(path) => info!("Keeping workspace of job {}: {}", job_id, path.display()),
            Workspace::Ephemeral(_) => info!("Discarding workspace of job {}", job_id),
            Workspace::InPlace(_) => {}
        }

        let status = job.status;
        info!("Job {} finished: {:?}", job_id, status);
        self.emit_event(ExecutionEvent::JobFinished { job_id, status }).await;
    }

    /// Mark every pending step of a job skipped and report each one
    async fn skip_remaining(&self, job: &mut Job, reason: &str) {
        let pending: Vec<String> = job
            .steps
            .iter()
            .filter(|s| matches!(s.state, StepState::Pending))
            .map(|s| s.id.clone())
            .collect();
        if pending.is_empty() {
            return;
        }

        warn!("Skipping {} step(s) of job {}: {}", pending.len(), job.id, reason);
        job.skip_pending(reason);

        for step_id in pending {
            self.emit_event(ExecutionEvent::StepSkipped {
                job_id: job.id.clone(),
                step_id,
                reason: reason.to_string(),
            })
            .await;
        }
    }
}
