//! Terminal output callback for streaming step execution
//!
//! This module provides the `TerminalOutputCallback` implementation that
//! displays the output of running steps in real-time.
//!
//! # Features
//!
//! - Step headers with progress indicators: `[2/3] lint`
//! - Horizontal separators between steps
//! - Stderr lines highlighted, or hidden with `show_stderr = false`
//!
//! # Example
//!
//! ```no_run
//! use pipeline_runner::cli::terminal_output::TerminalOutputCallback;
//! use pipeline_runner::execution::{OutputCallback, OutputStream};
//!
//! let callback = TerminalOutputCallback::new(true);
//! callback.begin_step(1, 3, "install");
//! callback.on_line("install", OutputStream::Stdout, "Resolving dependencies...");
//! ```

use crate::execution::{OutputCallback, OutputStream};
use console::style;
use std::io::{self, Write};

/// Callback that prints step output to the terminal as it is produced
#[derive(Debug)]
pub struct TerminalOutputCallback {
    show_stderr: bool,
}

impl TerminalOutputCallback {
    pub fn new(show_stderr: bool) -> Self {
        Self { show_stderr }
    }

    /// Print the separator and `[N/M] name` header of a step
    pub fn begin_step(&self, index: usize, total: usize, name: &str) {
        self.print_separator();
        println!(
            "[{} / {}] {}",
            style(index).cyan(),
            style(total).dim(),
            style(name).bold()
        );
        self.flush_stdout();
    }

    fn print_separator(&self) {
        let width = term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80);
        println!("{}", style("─".repeat(width)).dim());
    }

    /// Text shown for one line, `None` when the stream is hidden
    fn render_line(&self, stream: OutputStream, line: &str) -> Option<String> {
        match stream {
            OutputStream::Stdout => Some(line.to_string()),
            OutputStream::Stderr if self.show_stderr => Some(style(line).yellow().to_string()),
            OutputStream::Stderr => None,
        }
    }

    fn flush_stdout(&self) {
        let _ = io::stdout().flush();
    }
}

impl OutputCallback for TerminalOutputCallback {
    fn on_line(&self, _step_id: &str, stream: OutputStream, line: &str) {
        if let Some(text) = self.render_line(stream, line) {
            println!("{}", text);
            self.flush_stdout();
        }
    }
}
