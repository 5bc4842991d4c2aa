//! Test: the shipped manifests, run end to end against scripted tools

use crate::helpers::*;
use pipeline_runner::core::{ExecutionStatus, FailureKind, RepositoryEvent};

/// Push to main: install, lint and test all pass
#[tokio::test]
async fn test_push_to_main_succeeds() {
    let runner = python_runner();
    let result = TestRun::new(&runner)
        .secrets(test_secrets())
        .execute(pipeline_from_yaml(PULL_REQUEST_MANIFEST), RepositoryEvent::push("main"))
        .await;

    assert!(result.is_success(), "status was {:?}", result.status);
    assert_eq!(runner.step_labels(), vec!["install", "lint", "test"]);
    assert_step_completed(&result, "build", "install");
    assert_step_completed(&result, "build", "lint");
    assert_step_completed(&result, "build", "test");
    assert!(result.pipeline.state.failure.is_none());
    assert_eq!(result.pipeline.state.completed_steps, 3);
}

/// Pull request into main: lint exits 1, so test never runs
#[tokio::test]
async fn test_pull_request_lint_failure() {
    let runner = python_runner().reply("make check", 1, "src/app.py:3:1: F401 unused import\n", "");
    let result = TestRun::new(&runner)
        .secrets(test_secrets())
        .execute(
            pipeline_from_yaml(PULL_REQUEST_MANIFEST),
            RepositoryEvent::pull_request("main"),
        )
        .await;

    assert!(result.is_failed());
    assert_eq!(runner.step_labels(), vec!["install", "lint"]);
    assert_step_completed(&result, "build", "install");
    assert_step_failed(&result, "build", "lint", "exited with code 1");
    assert_step_skipped(&result, "build", "test");

    let failure = result.pipeline.state.failure.clone().unwrap();
    assert_eq!(failure.kind, FailureKind::Lint);
    assert_eq!(failure.step_id.as_deref(), Some("lint"));
    assert_eq!(failure.exit_code, Some(1));

    // The failing step's output is kept for display
    assert!(result
        .step_output("build", "lint")
        .unwrap()
        .contains("F401 unused import"));
}

/// Push to a feature branch: nothing runs at all
#[tokio::test]
async fn test_push_to_feature_branch_not_triggered() {
    let runner = python_runner();
    let result = TestRun::new(&runner)
        .secrets(test_secrets())
        .execute(
            pipeline_from_yaml(PULL_REQUEST_MANIFEST),
            RepositoryEvent::push("feature-x"),
        )
        .await;

    assert_eq!(result.status, ExecutionStatus::Skipped);
    // Not even the runtime probe
    assert!(runner.calls().is_empty());
    assert!(result.attempted_steps().is_empty());
}

/// The pinned-runtime manifest needs no secrets and installs its tooling first
#[tokio::test]
async fn test_pinned_runtime_manifest_runs_without_secrets() {
    let runner = python_runner();
    let result = TestRun::new(&runner)
        .execute(pipeline_from_yaml(PINNED_RUNTIME_MANIFEST), RepositoryEvent::push("main"))
        .await;

    assert!(result.is_success(), "status was {:?}", result.status);
    assert_eq!(runner.step_labels(), vec!["setup", "install", "lint", "test"]);
    assert_eq!(
        runner.call_for("setup").unwrap().command,
        "python3 -m pip install --user poetry"
    );
    assert!(runner.call_for("test").unwrap().env.get("OPENAI_API_KEY").is_none());
}

/// The two manifests agree on everything but the secret binding
#[test]
fn test_manifests_share_triggers() {
    let pull_request = pipeline_from_yaml(PULL_REQUEST_MANIFEST);
    let pinned = pipeline_from_yaml(PINNED_RUNTIME_MANIFEST);

    for event in [
        RepositoryEvent::push("main"),
        RepositoryEvent::pull_request("main"),
        RepositoryEvent::push("feature-x"),
        RepositoryEvent::pull_request("develop"),
    ] {
        assert_eq!(pull_request.should_run(&event), pinned.should_run(&event), "{:?}", event);
    }

    assert_eq!(pull_request.jobs[0].secret_names(), vec!["OPENAI_API_KEY_FOR_TEST"]);
    assert!(pinned.jobs[0].secret_names().is_empty());
}
