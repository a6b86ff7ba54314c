//! Child process execution for the external build tool.
//!
//! Three modes are supported:
//! - transparent: stdio inherited, so the tool's own formatting (colors,
//!   progress) reaches the terminal untouched; only the status comes back
//! - captured: stdout and stderr collected into memory, nothing shown
//! - tee: stdout inherited, stderr shown live and collected at the same time
//!
//! Every mode races the child against a cancellation future. When it fires
//! the child is killed and reaped and [`ExecError::Cancelled`] is returned.
//! A child that dies from SIGINT or SIGTERM is reported the same way.

use std::ffi::OsString;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ExecError {
  #[error("failed to start {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("failed while waiting for {program}: {source}")]
  Wait {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("{program} was interrupted")]
  Cancelled { program: String },
}

impl ExecError {
  /// True when the program could not be started because it does not exist.
  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound)
  }
}

/// A single command line to run from a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  program: PathBuf,
  args: Vec<String>,
  cwd: PathBuf,
  search_path: Option<OsString>,
}

impl Invocation {
  pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: cwd.into(),
      search_path: None,
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  /// `PATH` handed to the child, so tools it spawns are found too.
  pub fn with_search_path(mut self, path: Option<OsString>) -> Self {
    self.search_path = path;
    self
  }

  pub fn program(&self) -> &Path {
    &self.program
  }

  pub fn arguments(&self) -> &[String] {
    &self.args
  }

  pub fn cwd(&self) -> &Path {
    &self.cwd
  }

  fn command(&self) -> Command {
    let mut command = Command::new(&self.program);
    command.args(&self.args).current_dir(&self.cwd).kill_on_drop(true);
    if let Some(path) = &self.search_path {
      command.env("PATH", path);
    }
    command
  }

  fn program_name(&self) -> String {
    self.program.display().to_string()
  }
}

impl fmt::Display for Invocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "\"{}\"", self.program.display())?;
    for arg in &self.args {
      write!(f, " {}", arg)?;
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
  Transparent,
  Captured,
  Tee,
}

/// What came back from one run of an [`Invocation`].
///
/// `stdout`/`stderr` are only present for the streams the mode captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
  pub mode: ExecutionMode,
  /// Exit code, or `None` if the child was terminated by a signal.
  pub status: Option<i32>,
  pub stdout: Option<String>,
  pub stderr: Option<String>,
}

impl ExecutionOutcome {
  pub fn success(&self) -> bool {
    self.status == Some(0)
  }

  /// Captured diagnostic text, empty when nothing was captured.
  pub fn diagnostics(&self) -> &str {
    self.stderr.as_deref().unwrap_or("")
  }
}

/// Resolves once the user interrupts the process (Ctrl-C).
///
/// Never resolves if the signal handler cannot be installed.
pub async fn interrupted() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(error = %e, "failed to listen for interrupts");
    std::future::pending::<()>().await;
  }
}

/// Run with inherited stdio, cancelled by Ctrl-C.
pub async fn run_transparent(invocation: &Invocation) -> Result<ExecutionOutcome, ExecError> {
  run_transparent_until(invocation, interrupted()).await
}

/// Run with captured stdio, cancelled by Ctrl-C.
pub async fn run_captured(invocation: &Invocation) -> Result<ExecutionOutcome, ExecError> {
  run_captured_until(invocation, interrupted()).await
}

/// Run with stderr both shown and captured, cancelled by Ctrl-C.
pub async fn run_tee(invocation: &Invocation) -> Result<ExecutionOutcome, ExecError> {
  run_tee_until(invocation, interrupted()).await
}

pub async fn run_transparent_until<C>(invocation: &Invocation, cancel: C) -> Result<ExecutionOutcome, ExecError>
where
  C: Future<Output = ()>,
{
  info!(command = %invocation, "running");

  let mut command = invocation.command();
  command.stdin(Stdio::inherit()).stdout(Stdio::inherit()).stderr(Stdio::inherit());

  let mut child = spawn(invocation, &mut command)?;
  let status = wait_or_cancel(invocation, &mut child, cancel).await?;

  debug!(command = %invocation, status = ?status.code(), "finished");
  Ok(ExecutionOutcome {
    mode: ExecutionMode::Transparent,
    status: status.code(),
    stdout: None,
    stderr: None,
  })
}

pub async fn run_captured_until<C>(invocation: &Invocation, cancel: C) -> Result<ExecutionOutcome, ExecError>
where
  C: Future<Output = ()>,
{
  debug!(command = %invocation, "running with captured output");

  let mut command = invocation.command();
  command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

  let mut child = spawn(invocation, &mut command)?;
  let stdout = child.stdout.take().map(|s| tokio::spawn(collect(s)));
  let stderr = child.stderr.take().map(|s| tokio::spawn(collect(s)));

  let status = wait_or_cancel(invocation, &mut child, cancel).await?;

  let stdout = join_stream(invocation, stdout).await?;
  let stderr = join_stream(invocation, stderr).await?;

  if !stderr.is_empty() {
    debug!(stderr = %stderr, "command stderr");
  }

  Ok(ExecutionOutcome {
    mode: ExecutionMode::Captured,
    status: status.code(),
    stdout: Some(stdout),
    stderr: Some(stderr),
  })
}

pub async fn run_tee_until<C>(invocation: &Invocation, cancel: C) -> Result<ExecutionOutcome, ExecError>
where
  C: Future<Output = ()>,
{
  info!(command = %invocation, "running with stderr tee");

  let mut command = invocation.command();
  command.stdin(Stdio::inherit()).stdout(Stdio::inherit()).stderr(Stdio::piped());

  let mut child = spawn(invocation, &mut command)?;
  let stderr = child.stderr.take().map(|s| tokio::spawn(tee(s)));

  let status = wait_or_cancel(invocation, &mut child, cancel).await?;
  let stderr = join_stream(invocation, stderr).await?;

  Ok(ExecutionOutcome {
    mode: ExecutionMode::Tee,
    status: status.code(),
    stdout: None,
    stderr: Some(stderr),
  })
}

fn spawn(invocation: &Invocation, command: &mut Command) -> Result<Child, ExecError> {
  command.spawn().map_err(|source| ExecError::Spawn {
    program: invocation.program_name(),
    source,
  })
}

async fn wait_or_cancel<C>(invocation: &Invocation, child: &mut Child, cancel: C) -> Result<ExitStatus, ExecError>
where
  C: Future<Output = ()>,
{
  let finished = tokio::select! {
    status = child.wait() => Some(status),
    _ = cancel => None,
  };

  match finished {
    Some(Ok(status)) if interrupted_by_signal(&status) => {
      warn!(command = %invocation, %status, "child was interrupted");
      Err(ExecError::Cancelled {
        program: invocation.program_name(),
      })
    }
    Some(status) => status.map_err(|source| ExecError::Wait {
      program: invocation.program_name(),
      source,
    }),
    None => {
      warn!(command = %invocation, "interrupted, terminating child");
      if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to terminate child");
      }
      Err(ExecError::Cancelled {
        program: invocation.program_name(),
      })
    }
  }
}

/// A terminal interrupt reaches the whole foreground process group, so the
/// child can die from it before the cancellation future is polled.
#[cfg(unix)]
fn interrupted_by_signal(status: &ExitStatus) -> bool {
  use std::os::unix::process::ExitStatusExt;

  const SIGINT: i32 = 2;
  const SIGTERM: i32 = 15;
  matches!(status.signal(), Some(SIGINT | SIGTERM))
}

#[cfg(not(unix))]
fn interrupted_by_signal(_status: &ExitStatus) -> bool {
  false
}

async fn collect<R: AsyncRead + Unpin>(mut reader: R) -> io::Result<Vec<u8>> {
  let mut buf = Vec::new();
  reader.read_to_end(&mut buf).await?;
  Ok(buf)
}

/// Copy `reader` to our stderr as it arrives, keeping a copy.
async fn tee<R: AsyncRead + Unpin>(mut reader: R) -> io::Result<Vec<u8>> {
  let mut terminal = tokio::io::stderr();
  let mut captured = Vec::new();
  let mut chunk = [0u8; 8192];

  loop {
    let n = reader.read(&mut chunk).await?;
    if n == 0 {
      break;
    }
    terminal.write_all(&chunk[..n]).await?;
    terminal.flush().await?;
    captured.extend_from_slice(&chunk[..n]);
  }

  Ok(captured)
}

async fn join_stream(
  invocation: &Invocation,
  handle: Option<JoinHandle<io::Result<Vec<u8>>>>,
) -> Result<String, ExecError> {
  let Some(handle) = handle else {
    return Ok(String::new());
  };

  let bytes = handle
    .await
    .map_err(io::Error::other)
    .and_then(|r| r)
    .map_err(|source| ExecError::Wait {
      program: invocation.program_name(),
      source,
    })?;

  Ok(String::from_utf8_lossy(&bytes).into_owned())
}
