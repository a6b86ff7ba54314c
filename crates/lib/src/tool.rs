//! External executable resolution.
//!
//! Spawning a missing program yields a bare "No such file or directory" with
//! no hint of which program was meant. Resolving up front lets callers report
//! the exact tool that is missing.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum ToolError {
  #[error("the executable {tool} could not be found")]
  NotFound {
    tool: String,
    #[source]
    source: which::Error,
  },
}

impl ToolError {
  /// The path or name that failed to resolve.
  pub fn tool(&self) -> &str {
    match self {
      Self::NotFound { tool, .. } => tool,
    }
  }
}

/// Resolves tool names and paths against an extended search path.
///
/// Directories added with [`ToolResolver::with_dir`] are searched before
/// `PATH`, in the order they were added.
#[derive(Debug, Clone)]
pub struct ToolResolver {
  extra_dirs: Vec<PathBuf>,
  cwd: PathBuf,
}

impl Default for ToolResolver {
  fn default() -> Self {
    Self {
      extra_dirs: Vec::new(),
      cwd: PathBuf::from("."),
    }
  }
}

impl ToolResolver {
  pub fn new() -> Self {
    Self::default()
  }

  /// Resolver with the configured toolchain directory ahead of `PATH`.
  pub fn from_config(config: &Config) -> Self {
    let resolver = Self::new();
    match config.toolchain_dir() {
      Some(dir) => resolver.with_dir(dir),
      None => resolver,
    }
  }

  pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.extra_dirs.push(dir.into());
    self
  }

  /// Directory relative tool paths are resolved against.
  pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
    self.cwd = cwd.into();
    self
  }

  pub fn cwd(&self) -> &Path {
    &self.cwd
  }

  /// The effective search path: extra directories, then `PATH`.
  ///
  /// Also handed to child processes so tools they spawn see the toolchain.
  pub fn search_path(&self) -> Option<OsString> {
    let system = std::env::var_os("PATH");
    let dirs = self
      .extra_dirs
      .iter()
      .cloned()
      .chain(system.iter().flat_map(std::env::split_paths));
    std::env::join_paths(dirs).ok().or(system)
  }

  /// Resolve `tool` to an executable path.
  ///
  /// Bare names are looked up on the search path; anything containing a
  /// path separator must point at an executable file.
  pub fn resolve(&self, tool: impl AsRef<OsStr>) -> Result<PathBuf, ToolError> {
    let tool = tool.as_ref();
    match which::which_in(tool, self.search_path(), &self.cwd) {
      Ok(path) => {
        debug!(tool = %tool.to_string_lossy(), path = %path.display(), "resolved tool");
        Ok(path)
      }
      Err(source) => Err(ToolError::NotFound {
        tool: tool.to_string_lossy().into_owned(),
        source,
      }),
    }
  }
}
