//! Command runners.
//!
//! [`CommandRunner`] is the seam between composed commands and the operating
//! system. [`ProcessRunner`] spawns real processes with tokio;
//! [`FakeCommandRunner`] records every command and replays scripted results
//! so transports can be tested without the vendor binaries.

use crate::command::{CommandOutput, CommandSpec};
use crate::error::{CommandError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Boxed future returned by [`CommandRunner::run`].
pub type RunFuture<'a> = Pin<Box<dyn Future<Output = Result<CommandOutput>> + Send + 'a>>;

/// Executes composed commands.
///
/// Implementations must fail with [`CommandError::NonZeroExit`] when the
/// process exits unsuccessfully and with [`CommandError::Spawn`] when it
/// cannot be started. Standard error is captured and dropped.
pub trait CommandRunner: Send + Sync + fmt::Debug {
    /// Run `spec` to completion.
    fn run<'a>(&'a self, spec: &'a CommandSpec) -> RunFuture<'a>;
}

/// Runs commands as local child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create a new process runner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ProcessRunner {
    fn run<'a>(&'a self, spec: &'a CommandSpec) -> RunFuture<'a> {
        Box::pin(run_process(spec))
    }
}

async fn run_process(spec: &CommandSpec) -> Result<CommandOutput> {
    spec.validate()?;

    let program = spec.program();
    debug!(
        program,
        args = spec.arguments().len(),
        stdin = spec.stdin_payload().is_some(),
        "running command"
    );

    let mut cmd = Command::new(program);
    cmd.args(spec.arguments());
    for (key, value) in spec.environment() {
        cmd.env(key, value);
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.stdin(if spec.stdin_payload().is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = cmd
        .spawn()
        .map_err(|e| CommandError::spawn(program, e.to_string()))?;

    // Feed stdin while the child's output is drained, so a chatty child can't
    // block on a full stdout pipe before it has read its input.
    let stdin = child.stdin.take();
    let payload = spec.stdin_payload();
    let writer = async move {
        if let (Some(mut pipe), Some(payload)) = (stdin, payload) {
            pipe.write_all(payload.as_bytes()).await?;
            pipe.shutdown().await?;
        }
        Ok::<(), std::io::Error>(())
    };

    let (written, output) = tokio::join!(writer, child.wait_with_output());
    let output = output.map_err(|e| CommandError::spawn(program, e.to_string()))?;

    if !output.status.success() {
        let exit_code = output.status.code().unwrap_or(-1);
        debug!(program, exit_code, "command failed");
        return Err(CommandError::non_zero_exit(program, exit_code));
    }

    if let Err(e) = written {
        return Err(CommandError::spawn(
            program,
            format!("failed to write stdin: {e}"),
        ));
    }

    Ok(CommandOutput::new(output.stdout))
}

/// A scripted result for [`FakeCommandRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeResponse {
    /// Exit 0 with this stdout.
    Stdout(String),
    /// Exit with this non-zero code.
    Exit(i32),
    /// Fail to spawn with this message.
    SpawnError(String),
}

/// Test runner that records commands and replays scripted responses.
///
/// Responses are consumed in order. Once the script is exhausted every
/// command succeeds with empty output.
#[derive(Debug, Default)]
pub struct FakeCommandRunner {
    responses: Mutex<VecDeque<FakeResponse>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl FakeCommandRunner {
    /// Create a runner with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful run printing `stdout`.
    #[must_use]
    pub fn with_stdout(self, stdout: impl Into<String>) -> Self {
        self.push(FakeResponse::Stdout(stdout.into()));
        self
    }

    /// Script a run exiting with `code`.
    #[must_use]
    pub fn with_exit_code(self, code: i32) -> Self {
        self.push(FakeResponse::Exit(code));
        self
    }

    /// Script a spawn failure.
    #[must_use]
    pub fn with_spawn_error(self, message: impl Into<String>) -> Self {
        self.push(FakeResponse::SpawnError(message.into()));
        self
    }

    /// Append a response to the script.
    pub fn push(&self, response: FakeResponse) {
        self.responses.lock().push_back(response);
    }

    /// Every command run so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    /// Number of commands run so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// The most recent command, if any.
    #[must_use]
    pub fn last_call(&self) -> Option<CommandSpec> {
        self.calls.lock().last().cloned()
    }
}

impl CommandRunner for FakeCommandRunner {
    fn run<'a>(&'a self, spec: &'a CommandSpec) -> RunFuture<'a> {
        Box::pin(async move {
            spec.validate()?;
            self.calls.lock().push(spec.clone());
            match self.responses.lock().pop_front() {
                None => Ok(CommandOutput::default()),
                Some(FakeResponse::Stdout(stdout)) => Ok(CommandOutput::new(stdout.into_bytes())),
                Some(FakeResponse::Exit(code)) => {
                    Err(CommandError::non_zero_exit(spec.program(), code))
                }
                Some(FakeResponse::SpawnError(message)) => {
                    Err(CommandError::spawn(spec.program(), message))
                }
            }
        })
    }
}
