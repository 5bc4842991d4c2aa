//! Test: provisioning failures stop the run before any step

use crate::helpers::*;
use pipeline_runner::core::{FailureKind, RepositoryEvent};
use pipeline_runner::execution::ExecutionEvent;
use pipeline_runner::secrets::InMemorySecretStore;

#[tokio::test]
async fn test_runtime_mismatch_runs_no_steps() {
    let runner = MockRunner::new().prints("--version", "Python 3.12.1\n");
    let result = TestRun::new(&runner)
        .secrets(test_secrets())
        .execute(pipeline_from_yaml(PULL_REQUEST_MANIFEST), RepositoryEvent::push("main"))
        .await;

    assert!(result.is_failed());
    assert!(runner.step_labels().is_empty());
    assert!(result.attempted_steps().is_empty());

    let failure = result.pipeline.state.failure.clone().unwrap();
    assert_eq!(failure.kind, FailureKind::Provisioning);
    assert_eq!(failure.step_id, None);
    assert!(
        failure.message.contains("3.12.1") && failure.message.contains("3.11"),
        "unexpected message: {}",
        failure.message
    );

    for step in ["install", "lint", "test"] {
        assert_step_skipped(&result, "build", step);
    }
}

#[tokio::test]
async fn test_patch_release_satisfies_pin() {
    let runner = MockRunner::new().prints("--version", "Python 3.11.9\n");
    let result = TestRun::new(&runner)
        .secrets(test_secrets())
        .execute(pipeline_from_yaml(PULL_REQUEST_MANIFEST), RepositoryEvent::push("main"))
        .await;

    assert!(result.is_success());
    assert!(result.events.iter().any(|e| matches!(
        e,
        ExecutionEvent::JobProvisioned { runtime_version: Some(v), .. } if v == "3.11.9"
    )));
}

#[tokio::test]
async fn test_missing_runtime_fails_provisioning() {
    let runner = MockRunner::new().reply("--version", 127, "", "sh: python3: not found\n");
    let result = TestRun::new(&runner)
        .secrets(test_secrets())
        .execute(pipeline_from_yaml(PULL_REQUEST_MANIFEST), RepositoryEvent::push("main"))
        .await;

    assert!(result.is_failed());
    assert!(runner.step_labels().is_empty());
    assert_eq!(
        result.pipeline.state.failure.as_ref().map(|f| f.kind),
        Some(FailureKind::Provisioning)
    );
}

/// A missing secret is found before the workspace exists or any probe runs
#[tokio::test]
async fn test_missing_secret_fails_before_anything_runs() {
    let runner = python_runner();
    let result = TestRun::new(&runner)
        .secrets(InMemorySecretStore::new())
        .execute(pipeline_from_yaml(PULL_REQUEST_MANIFEST), RepositoryEvent::push("main"))
        .await;

    assert!(result.is_failed());
    assert!(runner.calls().is_empty());

    let failure = result.pipeline.state.failure.clone().unwrap();
    assert_eq!(failure.kind, FailureKind::Provisioning);
    assert!(failure.message.contains("OPENAI_API_KEY_FOR_TEST"));

    let provisioning_failed = result.events.iter().find_map(|e| match e {
        ExecutionEvent::ProvisioningFailed { job_id, error } => Some((job_id.clone(), error.clone())),
        _ => None,
    });
    let (job_id, error) = provisioning_failed.expect("ProvisioningFailed event");
    assert_eq!(job_id, "build");
    assert!(error.contains("OPENAI_API_KEY_FOR_TEST"));
}

/// Jobs without a runtime pin skip the probe entirely
#[tokio::test]
async fn test_unpinned_job_has_no_probe() {
    let yaml = r#"
name: "unpinned"
jobs:
  - id: "build"
    steps:
      - id: "echo"
        run: "echo hi"
"#;
    let runner = MockRunner::new();
    let result = TestRun::new(&runner)
        .execute(pipeline_from_yaml(yaml), RepositoryEvent::push("main"))
        .await;

    assert!(result.is_success());
    assert_eq!(runner.calls().len(), 1);
    assert!(result.events.iter().any(|e| matches!(
        e,
        ExecutionEvent::JobProvisioned { runtime_version: None, .. }
    )));
}
