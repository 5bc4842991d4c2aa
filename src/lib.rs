//! pipeline-runner - a CI pipeline runner for install, lint and test jobs

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod secrets;

// Re-export commonly used types
pub use core::{EventKind, ExecutionStatus, Pipeline, RepositoryEvent, Step, StepState};
pub use execution::{CommandRunner, ExecutionEngine, ExecutionEvent, ProvisionOptions, ShellRunner};
pub use secrets::{EnvSecretStore, InMemorySecretStore, SecretStore};
