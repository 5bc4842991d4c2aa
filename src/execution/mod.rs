//! Pipeline execution engine

pub mod engine;
pub mod executor;
pub mod output;
pub mod process;
pub mod provision;
pub mod scheduler;

pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::{StepExecutor, StepOutcome};
pub use output::{OutputCallback, OutputStream, RedactingCallback};
pub use process::{CommandRunner, Invocation, ProcessError, ProcessOutput, ShellRunner};
pub use provision::{ProvisionError, ProvisionOptions, ProvisionedJob, Provisioner, Workspace};
pub use scheduler::ExecutionScheduler;
