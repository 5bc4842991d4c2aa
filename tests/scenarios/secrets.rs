//! Test: secret injection and redaction

use crate::helpers::*;
use pipeline_runner::core::{RepositoryEvent, StepState};
use pipeline_runner::execution::OutputCallback;
use std::sync::Arc;

#[tokio::test]
async fn test_secret_bound_only_to_test_step() {
    let runner = python_runner();
    let result = TestRun::new(&runner)
        .secrets(test_secrets())
        .execute(pipeline_from_yaml(PULL_REQUEST_MANIFEST), RepositoryEvent::push("main"))
        .await;
    assert!(result.is_success());

    let test = runner.call_for("test").unwrap();
    assert_eq!(test.env.get("OPENAI_API_KEY").map(String::as_str), Some(TEST_API_KEY));
    assert_eq!(test.env.get("CI").map(String::as_str), Some("true"));

    for step in ["install", "lint"] {
        let call = runner.call_for(step).unwrap();
        assert!(call.env.get("OPENAI_API_KEY").is_none(), "{} saw the key", step);
        assert!(!call.env.values().any(|v| v == TEST_API_KEY));
    }
}

#[tokio::test]
async fn test_secret_never_appears_in_command_line() {
    let runner = python_runner();
    TestRun::new(&runner)
        .secrets(test_secrets())
        .execute(pipeline_from_yaml(PULL_REQUEST_MANIFEST), RepositoryEvent::push("main"))
        .await;

    assert!(runner.calls().iter().all(|c| !c.command.contains(TEST_API_KEY)));
}

#[tokio::test]
async fn test_secret_redacted_from_failed_output() {
    let leak = format!("request failed: invalid key {}\n", TEST_API_KEY);
    let runner = python_runner().reply("pytest", 1, "", &leak);
    let collector = Arc::new(CollectingCallback::default());
    let result = TestRun::new(&runner)
        .secrets(test_secrets())
        .output(collector.clone() as Arc<dyn OutputCallback>)
        .execute(pipeline_from_yaml(PULL_REQUEST_MANIFEST), RepositoryEvent::push("main"))
        .await;

    assert!(result.is_failed());

    let output = result.step_output("build", "test").unwrap();
    assert!(!output.contains(TEST_API_KEY));
    assert!(output.contains("invalid key ***"));

    let lines = collector.lines.lock().unwrap();
    assert!(!lines.is_empty());
    assert!(lines.iter().all(|(_, _, line)| !line.contains(TEST_API_KEY)));
    assert!(lines.iter().any(|(step, _, line)| step == "test" && line.contains("***")));
}

#[tokio::test]
async fn test_secret_redacted_from_successful_output() {
    let runner = python_runner().prints("pytest", &format!("using key {}\n1 passed\n", TEST_API_KEY));
    let result = TestRun::new(&runner)
        .secrets(test_secrets())
        .execute(pipeline_from_yaml(PULL_REQUEST_MANIFEST), RepositoryEvent::push("main"))
        .await;

    match result.step_state("build", "test") {
        StepState::Completed { output, .. } => {
            assert!(!output.contains(TEST_API_KEY));
            assert!(output.contains("1 passed"));
        }
        other => panic!("test step should have completed, was {:?}", other),
    }
}

/// Job-level secret bindings reach every step of the job
#[tokio::test]
async fn test_job_level_secret() {
    let yaml = r#"
name: "job-secret"
jobs:
  - id: "deploy"
    env:
      TOKEN:
        secret: DEPLOY_TOKEN
    steps:
      - id: "first"
        run: "echo one"
      - id: "second"
        run: "echo two"
"#;
    let runner = MockRunner::new();
    let secrets = pipeline_runner::secrets::InMemorySecretStore::new().with_secret("DEPLOY_TOKEN", "tok-123");
    let result = TestRun::new(&runner)
        .secrets(secrets)
        .execute(pipeline_from_yaml(yaml), RepositoryEvent::push("main"))
        .await;

    assert!(result.is_success());
    for step in ["first", "second"] {
        let call = runner.call_for(step).unwrap();
        assert_eq!(call.env.get("TOKEN").map(String::as_str), Some("tok-123"));
    }
}
