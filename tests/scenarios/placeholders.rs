//! Test: command rendering

use crate::helpers::*;
use pipeline_runner::core::{FailureKind, RepositoryEvent};

const RENDERING: &str = r#"
name: "rendering"
variables:
  tool: "poetry"
  retries: 3
jobs:
  - id: "build"
    steps:
      - id: "install"
        kind: install
        run: "{{ tool }} install --retries {{retries}}"
      - id: "report"
        run: "echo {{ event }} on {{ branch }} in {{ job }}/{{ step }}"
"#;

#[tokio::test]
async fn test_variables_and_builtins_rendered() {
    let runner = MockRunner::new();
    let result = TestRun::new(&runner)
        .execute(pipeline_from_yaml(RENDERING), RepositoryEvent::pull_request("main"))
        .await;

    assert!(result.is_success());
    assert_eq!(runner.call_for("install").unwrap().command, "poetry install --retries 3");
    assert_eq!(
        runner.call_for("report").unwrap().command,
        "echo pull_request on main in build/report"
    );
}

#[tokio::test]
async fn test_manifest_commands_rendered() {
    let runner = python_runner();
    TestRun::new(&runner)
        .secrets(test_secrets())
        .execute(pipeline_from_yaml(PULL_REQUEST_MANIFEST), RepositoryEvent::push("main"))
        .await;

    let commands: Vec<String> = runner
        .calls()
        .into_iter()
        .filter(|c| !c.label.ends_with("-probe"))
        .map(|c| c.command)
        .collect();
    assert_eq!(
        commands,
        vec!["poetry install", "poetry run make check", "poetry run pytest"]
    );
}

/// Overriding a variable before the run changes the rendered command
#[tokio::test]
async fn test_variable_override() {
    let runner = MockRunner::new();
    let mut pipeline = pipeline_from_yaml(RENDERING);
    pipeline.variables.insert("tool".to_string(), "uv".to_string());

    TestRun::new(&runner)
        .execute(pipeline, RepositoryEvent::push("main"))
        .await;

    assert_eq!(runner.call_for("install").unwrap().command, "uv install --retries 3");
}

/// An unresolved placeholder fails the step without spawning it
#[tokio::test]
async fn test_unresolved_placeholder_fails_step() {
    let yaml = r#"
name: "broken"
jobs:
  - id: "build"
    steps:
      - id: "install"
        kind: install
        run: "{{ package_manager }} install"
      - id: "test"
        kind: test
        run: "make test"
"#;
    let runner = MockRunner::new();
    let result = TestRun::new(&runner)
        .execute(pipeline_from_yaml(yaml), RepositoryEvent::push("main"))
        .await;

    assert!(result.is_failed());
    assert!(runner.calls().is_empty());
    assert_step_failed(&result, "build", "install", "package_manager");
    assert_step_skipped(&result, "build", "test");

    let failure = result.pipeline.state.failure.clone().unwrap();
    assert_eq!(failure.kind, FailureKind::Install);
    assert_eq!(failure.exit_code, None);
}
