//! Segment sizes of a linked artifact, read with an external `size` tool.
//!
//! The tool prints a header line followed by one row per file whose first
//! three columns are text, data and bss:
//!
//! ```text
//!    text    data     bss     dec     hex filename
//!    1204      20     512    1736     6c8 build/basalt/app.elf
//! ```

use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::exec::{ExecError, Invocation, run_captured};
use crate::tool::{ToolError, ToolResolver};

#[derive(Debug, Error)]
pub enum SizeError {
  #[error(transparent)]
  Tool(#[from] ToolError),

  #[error(transparent)]
  Exec(#[from] ExecError),

  #[error("command {command} failed with exit code {status:?}. stdout: {stdout}, stderr: {stderr}")]
  Failed {
    command: String,
    status: Option<i32>,
    stdout: String,
    stderr: String,
  },

  #[error("unexpected size output: {0}")]
  Parse(String),
}

/// Segment sizes in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
  pub text: u64,
  pub data: u64,
  pub bss: u64,
}

/// Parse the text, data and bss columns from the second line of output.
pub fn parse_size_output(output: &str) -> Result<MemoryUsage, SizeError> {
  let row = output
    .lines()
    .nth(1)
    .ok_or_else(|| SizeError::Parse("missing size row".to_string()))?;

  let mut fields = row.split_whitespace().map(|f| {
    f.parse::<u64>()
      .map_err(|_| SizeError::Parse(format!("not a size: {:?} in {:?}", f, row)))
  });

  let mut next = || {
    fields
      .next()
      .unwrap_or_else(|| Err(SizeError::Parse(format!("too few columns in {:?}", row))))
  };

  Ok(MemoryUsage {
    text: next()?,
    data: next()?,
    bss: next()?,
  })
}

/// Run `size_tool` on `artifact` and parse its output.
pub async fn read_memory_usage(
  resolver: &ToolResolver,
  size_tool: &str,
  artifact: &Path,
) -> Result<MemoryUsage, SizeError> {
  let tool = resolver.resolve(size_tool)?;
  let invocation = Invocation::new(tool, resolver.cwd())
    .arg(artifact.display().to_string())
    .with_search_path(resolver.search_path());

  let outcome = run_captured(&invocation).await?;
  let stdout = outcome.stdout.clone().unwrap_or_default();

  if !outcome.success() {
    return Err(SizeError::Failed {
      command: invocation.to_string(),
      status: outcome.status,
      stdout,
      stderr: outcome.diagnostics().to_string(),
    });
  }

  let usage = parse_size_output(&stdout)?;
  debug!(artifact = %artifact.display(), ?usage, "read memory usage");
  Ok(usage)
}

/// Best-effort variant of [`read_memory_usage`].
///
/// Any failure is logged and yields `None`; size metrics never fail a build.
pub async fn memory_usage(resolver: &ToolResolver, size_tool: &str, artifact: &Path) -> Option<MemoryUsage> {
  match read_memory_usage(resolver, size_tool, artifact).await {
    Ok(usage) => Some(usage),
    Err(SizeError::Tool(e)) => {
      error!(
        "The command {} could not be found. Could not collect memory usage analytics.",
        e.tool()
      );
      None
    }
    Err(e) => {
      error!(artifact = %artifact.display(), "{}", e);
      None
    }
  }
}
