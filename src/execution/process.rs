//! External process invocation

use crate::execution::output::{OutputCallback, OutputStream};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Errors starting or supervising a process
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process group was killed; output printed before the deadline is kept
    #[error("timed out after {secs} seconds")]
    Timeout {
        secs: u64,
        stdout: String,
        stderr: String,
    },

    #[error("I/O error while running process: {0}")]
    Io(#[from] std::io::Error),
}

/// A single command to run
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Step (or probe) the command belongs to; passed to output callbacks
    pub label: String,

    /// Shell command line
    pub command: String,

    /// Directory the process starts in
    pub working_dir: PathBuf,

    /// Extra environment on top of the inherited one
    pub env: BTreeMap<String, String>,

    /// Kill the process after this long
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(label: impl Into<String>, command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
            working_dir: working_dir.into(),
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code (-1 when killed by a signal)
    pub exit_code: i32,

    /// Captured stdout
    pub stdout: String,

    /// Captured stderr
    pub stderr: String,

    /// Wall time in milliseconds
    pub duration_ms: u64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}{}", self.stdout, self.stderr),
        }
    }
}

/// Trait for process execution - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the invocation to completion, streaming lines to `callback`
    async fn run(
        &self,
        invocation: &Invocation,
        callback: Option<&dyn OutputCallback>,
    ) -> Result<ProcessOutput, ProcessError>;
}

/// Runs commands through the platform shell
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    flag: String,
}

impl Default for ShellRunner {
    fn default() -> Self {
        if cfg!(windows) {
            Self::new("cmd", "/C")
        } else {
            Self::new("sh", "-c")
        }
    }
}

impl ShellRunner {
    pub fn new(shell: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            flag: flag.into(),
        }
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        callback: Option<&dyn OutputCallback>,
    ) -> Result<ProcessOutput, ProcessError> {
        debug!(
            "Spawning `{}` in {}",
            invocation.command,
            invocation.working_dir.display()
        );
        let start = Instant::now();

        let mut command = Command::new(&self.shell);
        command
            .arg(&self.flag)
            .arg(&invocation.command)
            .current_dir(&invocation.working_dir)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout or cancel reaches everything the shell started
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            command: invocation.command.clone(),
            source,
        })?;
        let mut group = ProcessGroup::new(child.id());

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let label = invocation.label.as_str();

        // Pipes stay open until every process holding them is gone, so the
        // drains finish once the group is killed and keep what was printed
        let wait = async {
            let Some(limit) = invocation.timeout else {
                return child.wait().await.map(Some);
            };
            match timeout(limit, child.wait()).await {
                Ok(status) => status.map(Some),
                Err(_) => {
                    warn!("`{}` timed out after {}s", invocation.command, limit.as_secs());
                    group.kill();
                    let _ = child.start_kill();
                    child.wait().await?;
                    Ok(None)
                }
            }
        };

        let (stdout, stderr, status) = tokio::join!(
            drain(stdout, label, OutputStream::Stdout, callback),
            drain(stderr, label, OutputStream::Stderr, callback),
            wait,
        );
        let (stdout, stderr) = (stdout?, stderr?);

        let Some(status) = status? else {
            return Err(ProcessError::Timeout {
                secs: invocation.timeout.map(|t| t.as_secs()).unwrap_or_default(),
                stdout,
                stderr,
            });
        };
        group.release();

        let exit_code = status.code().unwrap_or(-1);
        debug!("`{}` exited with {}", invocation.command, exit_code);

        Ok(ProcessOutput {
            exit_code,
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Process group of a spawned shell, killed on drop unless released
///
/// Dropping the `run` future (Ctrl-C) kills the whole group, not just the
/// shell that `kill_on_drop` reaches.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    /// The leader exited on its own; leave the group alone
    fn release(&mut self) {
        self.pgid = None;
    }

    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        #[cfg(unix)]
        {
            // SAFETY: plain syscall; a negative pid addresses the group we created
            let rc = unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
            if rc != 0 {
                debug!("process group {} already gone", pgid);
            }
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn drain<R>(
    reader: Option<R>,
    label: &str,
    stream: OutputStream,
    callback: Option<&dyn OutputCallback>,
) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(String::new());
    };

    let mut reader = BufReader::new(reader);
    let mut captured = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        if let Some(cb) = callback {
            cb.on_line(label, stream, line.trim_end_matches(['\n', '\r']));
        }
        captured.push_str(&line);
    }

    Ok(captured)
}
