//! Test: which repository events start a run

use crate::helpers::*;
use pipeline_runner::core::{EventKind, ExecutionStatus, RepositoryEvent};
use pipeline_runner::execution::ExecutionEvent;

#[tokio::test]
async fn test_push_to_main_runs() {
    let runner = python_runner();
    let result = TestRun::new(&runner)
        .secrets(test_secrets())
        .execute(pipeline_from_yaml(PULL_REQUEST_MANIFEST), RepositoryEvent::push("main"))
        .await;

    assert!(result.is_success());
    assert!(!runner.step_labels().is_empty());
}

#[tokio::test]
async fn test_pull_request_into_main_runs() {
    let runner = python_runner();
    let result = TestRun::new(&runner)
        .secrets(test_secrets())
        .execute(
            pipeline_from_yaml(PULL_REQUEST_MANIFEST),
            RepositoryEvent::pull_request("main"),
        )
        .await;

    assert!(result.is_success());
}

#[tokio::test]
async fn test_pull_request_into_other_branch_is_skipped() {
    let runner = python_runner();
    let result = TestRun::new(&runner)
        .secrets(test_secrets())
        .execute(
            pipeline_from_yaml(PULL_REQUEST_MANIFEST),
            RepositoryEvent::pull_request("develop"),
        )
        .await;

    assert_eq!(result.status, ExecutionStatus::Skipped);
    assert!(runner.calls().is_empty());
    assert_step_skipped(&result, "build", "install");
    assert_step_skipped(&result, "build", "test");
}

#[tokio::test]
async fn test_tag_event_never_runs() {
    let runner = python_runner();
    let result = TestRun::new(&runner)
        .secrets(test_secrets())
        .execute(
            pipeline_from_yaml(PULL_REQUEST_MANIFEST),
            RepositoryEvent::new(EventKind::Tag, "main"),
        )
        .await;

    assert_eq!(result.status, ExecutionStatus::Skipped);
    assert!(runner.calls().is_empty());
}

/// A skipped run reports why, and nothing else happens
#[tokio::test]
async fn test_skipped_run_events() {
    let runner = MockRunner::new();
    let result = TestRun::new(&runner)
        .execute(pipeline_from_yaml(PULL_REQUEST_MANIFEST), RepositoryEvent::push("feature-x"))
        .await;

    assert!(matches!(
        result.events.get(1),
        Some(ExecutionEvent::PipelineSkipped { reason, .. }) if reason.contains("feature-x")
    ));
    assert!(!result
        .events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::JobStarted { .. } | ExecutionEvent::StepStarted { .. })));
}

/// Omitting `on:` means main only
#[tokio::test]
async fn test_default_triggers() {
    let yaml = r#"
name: "defaults"
jobs:
  - id: "build"
    steps:
      - id: "echo"
        run: "echo hi"
"#;
    let pipeline = pipeline_from_yaml(yaml);
    assert!(pipeline.should_run(&RepositoryEvent::push("main")));
    assert!(pipeline.should_run(&RepositoryEvent::pull_request("main")));
    assert!(!pipeline.should_run(&RepositoryEvent::push("release")));

    let runner = MockRunner::new();
    let result = TestRun::new(&runner)
        .execute(pipeline, RepositoryEvent::push("release"))
        .await;
    assert_eq!(result.status, ExecutionStatus::Skipped);
    assert!(runner.calls().is_empty());
}

/// Glob branch filters
#[tokio::test]
async fn test_branch_patterns() {
    let yaml = r#"
name: "release-branches"
on:
  push:
    branches: ["release/*"]
jobs:
  - id: "build"
    steps:
      - id: "echo"
        run: "echo hi"
"#;
    let runner = MockRunner::new();
    let result = TestRun::new(&runner)
        .execute(pipeline_from_yaml(yaml), RepositoryEvent::push("release/1.2"))
        .await;
    assert!(result.is_success());
    assert_eq!(runner.step_labels(), vec!["echo"]);

    // No pull_request section: pull requests never trigger
    let pipeline = pipeline_from_yaml(yaml);
    assert!(!pipeline.should_run(&RepositoryEvent::pull_request("release/1.2")));
    assert!(!pipeline.should_run(&RepositoryEvent::push("main")));
}
