//! Live output of running steps
//!
//! A [`CommandRunner`](crate::execution::CommandRunner) reads a child's stdout
//! and stderr line by line and hands every line to an [`OutputCallback`]
//! while the process is still running.
//!
//! # Example
//!
//! ```
//! use pipeline_runner::execution::{OutputCallback, OutputStream};
//!
//! struct Printer;
//!
//! impl OutputCallback for Printer {
//!     fn on_line(&self, step_id: &str, stream: OutputStream, line: &str) {
//!         println!("[{}:{:?}] {}", step_id, stream, line);
//!     }
//! }
//! ```

use crate::secrets::Redactor;
use std::sync::Arc;

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Callback for lines produced by a running step
///
/// This trait is object-safe and can be used as `&dyn OutputCallback`.
pub trait OutputCallback: Send + Sync {
    /// Called once per line, without the trailing newline
    fn on_line(&self, step_id: &str, stream: OutputStream, line: &str);
}

/// Masks secrets before forwarding to another callback
pub struct RedactingCallback {
    inner: Arc<dyn OutputCallback>,
    redactor: Redactor,
}

impl RedactingCallback {
    pub fn new(inner: Arc<dyn OutputCallback>, redactor: Redactor) -> Self {
        Self { inner, redactor }
    }
}

impl OutputCallback for RedactingCallback {
    fn on_line(&self, step_id: &str, stream: OutputStream, line: &str) {
        if self.redactor.is_empty() {
            self.inner.on_line(step_id, stream, line);
        } else {
            self.inner.on_line(step_id, stream, &self.redactor.redact(line));
        }
    }
}
