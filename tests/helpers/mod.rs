//! Test utility functions for pipeline-runner

#![allow(dead_code)]

use async_trait::async_trait;
use pipeline_runner::core::{
    config::PipelineConfig, ExecutionStatus, Pipeline, RepositoryEvent, StepState,
};
use pipeline_runner::execution::{
    CommandRunner, ExecutionEngine, ExecutionEvent, Invocation, OutputCallback, OutputStream,
    ProcessError, ProcessOutput, ProvisionOptions,
};
use pipeline_runner::secrets::{InMemorySecretStore, SecretStore};
use std::sync::{Arc, Mutex};

/// Scripted reply for commands containing a pattern
#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    exit_code: i32,
    stdout: String,
    stderr: String,
}

/// Mock runner that answers commands from a script instead of spawning them
///
/// Unmatched commands exit 0 with no output. Every invocation is recorded.
#[derive(Clone, Default)]
pub struct MockRunner {
    rules: Arc<Mutex<Vec<Rule>>>,
    calls: Arc<Mutex<Vec<Invocation>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `pattern` exit with `exit_code`
    pub fn exits(self, pattern: &str, exit_code: i32) -> Self {
        self.reply(pattern, exit_code, "", "")
    }

    /// Commands containing `pattern` exit 0 and print `stdout`
    pub fn prints(self, pattern: &str, stdout: &str) -> Self {
        self.reply(pattern, 0, stdout, "")
    }

    pub fn reply(self, pattern: &str, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        });
        self
    }

    /// Every invocation, probes included
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Labels of step invocations (probe invocations excluded), in order
    pub fn step_labels(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.label.ends_with("-probe"))
            .map(|c| c.label)
            .collect()
    }

    /// The recorded invocation of a step
    pub fn call_for(&self, step_id: &str) -> Option<Invocation> {
        self.calls().into_iter().find(|c| c.label == step_id)
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        callback: Option<&dyn OutputCallback>,
    ) -> Result<ProcessOutput, ProcessError> {
        self.calls.lock().unwrap().push(invocation.clone());

        let rule = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .find(|r| invocation.command.contains(&r.pattern))
            .cloned();
        let (exit_code, stdout, stderr) = match rule {
            Some(r) => (r.exit_code, r.stdout, r.stderr),
            None => (0, String::new(), String::new()),
        };

        if let Some(cb) = callback {
            for line in stdout.lines() {
                cb.on_line(&invocation.label, OutputStream::Stdout, line);
            }
            for line in stderr.lines() {
                cb.on_line(&invocation.label, OutputStream::Stderr, line);
            }
        }

        Ok(ProcessOutput {
            exit_code,
            stdout,
            stderr,
            duration_ms: 1,
        })
    }
}

/// Output callback that keeps every line
#[derive(Default)]
pub struct CollectingCallback {
    pub lines: Mutex<Vec<(String, OutputStream, String)>>,
}

impl OutputCallback for CollectingCallback {
    fn on_line(&self, step_id: &str, stream: OutputStream, line: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((step_id.to_string(), stream, line.to_string()));
    }
}

/// Test result from running a pipeline
pub struct PipelineTestResult {
    pub pipeline: Pipeline,
    pub status: ExecutionStatus,
    pub events: Vec<ExecutionEvent>,
}

impl PipelineTestResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == ExecutionStatus::Failed
    }

    pub fn step_state(&self, job_id: &str, step_id: &str) -> &StepState {
        &self
            .pipeline
            .step(job_id, step_id)
            .unwrap_or_else(|| panic!("Step '{}/{}' not found in result", job_id, step_id))
            .state
    }

    /// Steps whose process was attempted, in order
    pub fn attempted_steps(&self) -> Vec<String> {
        self.pipeline
            .attempted_steps()
            .into_iter()
            .map(|(_, step)| step.to_string())
            .collect()
    }

    pub fn step_output(&self, job_id: &str, step_id: &str) -> Option<String> {
        match self.step_state(job_id, step_id) {
            StepState::Completed { output, .. } | StepState::Failed { output, .. } => Some(output.clone()),
            _ => None,
        }
    }
}

/// Pipeline parsed from YAML, panicking on invalid manifests
pub fn pipeline_from_yaml(yaml: &str) -> Pipeline {
    PipelineConfig::from_yaml(yaml)
        .unwrap_or_else(|e| panic!("manifest should parse: {:#}", e))
        .to_pipeline()
}

/// Builder for a test run
pub struct TestRun {
    runner: MockRunner,
    secrets: Arc<dyn SecretStore>,
    options: ProvisionOptions,
    callback: Option<Arc<dyn OutputCallback>>,
}

impl TestRun {
    pub fn new(runner: &MockRunner) -> Self {
        Self {
            runner: runner.clone(),
            secrets: Arc::new(InMemorySecretStore::new()),
            // Mock commands never touch the filesystem
            options: ProvisionOptions {
                in_place: true,
                ..Default::default()
            },
            callback: None,
        }
    }

    pub fn secrets(mut self, secrets: InMemorySecretStore) -> Self {
        self.secrets = Arc::new(secrets);
        self
    }

    pub fn output(mut self, callback: Arc<dyn OutputCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub async fn execute(self, mut pipeline: Pipeline, event: RepositoryEvent) -> PipelineTestResult {
        let mut engine = ExecutionEngine::new(self.runner, self.secrets, self.options);
        if let Some(callback) = self.callback {
            engine = engine.with_output_callback(callback);
        }

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        engine
            .add_event_handler(move |event| sink.lock().unwrap().push(event))
            .await;

        let status = engine.execute(&mut pipeline, &event).await;
        let events = events.lock().unwrap().clone();

        PipelineTestResult {
            pipeline,
            status,
            events,
        }
    }
}

/// Assert a step ran and exited 0
pub fn assert_step_completed(result: &PipelineTestResult, job_id: &str, step_id: &str) {
    let state = result.step_state(job_id, step_id);
    assert!(
        matches!(state, StepState::Completed { .. }),
        "Step '{}' should be completed, but was in state: {:?}",
        step_id,
        state
    );
}

/// Assert a step failed with an error containing `expected_error`
pub fn assert_step_failed(result: &PipelineTestResult, job_id: &str, step_id: &str, expected_error: &str) {
    match result.step_state(job_id, step_id) {
        StepState::Failed { error, .. } => assert!(
            error.contains(expected_error),
            "Step '{}' error:\n{}\n\ndoes not contain:\n{}",
            step_id,
            error,
            expected_error
        ),
        other => panic!("Step '{}' should have failed, but was in state: {:?}", step_id, other),
    }
}

/// Assert a step never ran
pub fn assert_step_skipped(result: &PipelineTestResult, job_id: &str, step_id: &str) {
    let state = result.step_state(job_id, step_id);
    assert!(
        matches!(state, StepState::Skipped { .. }),
        "Step '{}' should be skipped, but was in state: {:?}",
        step_id,
        state
    );
}

/// The shipped pull request manifest
pub const PULL_REQUEST_MANIFEST: &str = include_str!("../../pipelines/pull-request.yaml");

/// The shipped pinned-runtime manifest
pub const PINNED_RUNTIME_MANIFEST: &str = include_str!("../../pipelines/pinned-runtime.yaml");

/// Value bound to `OPENAI_API_KEY_FOR_TEST` in tests
pub const TEST_API_KEY: &str = "sk-test-4f9a2c";

/// Runner whose runtime probe reports Python 3.11.4
pub fn python_runner() -> MockRunner {
    MockRunner::new().prints("--version", "Python 3.11.4\n")
}

/// Secret store holding the test API key
pub fn test_secrets() -> InMemorySecretStore {
    InMemorySecretStore::new().with_secret("OPENAI_API_KEY_FOR_TEST", TEST_API_KEY)
}
