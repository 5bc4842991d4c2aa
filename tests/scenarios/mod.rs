//! Scenario-based tests for pipeline-runner

mod end_to_end;
mod placeholders;
mod provisioning;
mod secrets;
mod triggers;
