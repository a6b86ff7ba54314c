//! Layered configuration.
//!
//! Values are resolved in order, each layer overriding the previous one:
//! built-in defaults, the JSON config file, then `BUILDLENS_*` environment
//! variables. Command-line flags are applied on top by the CLI.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{DEFAULT_ANALYZER_TOOL, DEFAULT_BINARY_NAME, DEFAULT_BUILD_TOOL, DEFAULT_SIZE_TOOL};
use crate::platform::paths::config_file;

const SDK_ROOT_VAR: &str = "BUILDLENS_SDK_ROOT";
const BUILD_TOOL_VAR: &str = "BUILDLENS_BUILD_TOOL";
const TOOLCHAIN_DIR_VAR: &str = "BUILDLENS_TOOLCHAIN_DIR";
const DIAGNOSTICS_VAR: &str = "BUILDLENS_DIAGNOSTICS";
const TELEMETRY_VAR: &str = "BUILDLENS_TELEMETRY";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config file {}: {source}", .path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid value for {var}: {value:?}")]
  InvalidEnv { var: &'static str, value: String },
}

/// How diagnostic text is obtained when the build tool fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticsMode {
  /// Run transparently, then re-run captured on failure.
  #[default]
  Rerun,
  /// Run once, copying stderr to the terminal and to a buffer.
  Tee,
}

impl DiagnosticsMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Rerun => "rerun",
      Self::Tee => "tee",
    }
  }
}

impl fmt::Display for DiagnosticsMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for DiagnosticsMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "rerun" => Ok(Self::Rerun),
      "tee" => Ok(Self::Tee),
      other => Err(format!("unknown diagnostics mode: {}", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Root of the installed SDK.
  pub sdk_root: Option<PathBuf>,

  /// Explicit build tool path or name. Overrides the SDK default.
  pub build_tool: Option<PathBuf>,

  /// Directory holding the cross toolchain, searched before `PATH`.
  pub toolchain_dir: Option<PathBuf>,

  pub size_tool: String,
  pub analyzer_tool: String,

  /// File name of the linked binary inside `build/<platform>/`.
  pub binary_name: String,

  pub diagnostics: DiagnosticsMode,
  pub telemetry: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      sdk_root: None,
      build_tool: None,
      toolchain_dir: None,
      size_tool: DEFAULT_SIZE_TOOL.to_string(),
      analyzer_tool: DEFAULT_ANALYZER_TOOL.to_string(),
      binary_name: DEFAULT_BINARY_NAME.to_string(),
      diagnostics: DiagnosticsMode::default(),
      telemetry: true,
    }
  }
}

impl Config {
  /// Load the config file (if any) and apply environment overrides.
  pub fn load() -> Result<Self, ConfigError> {
    let mut config = Self::from_file(&config_file())?;
    config.apply_env()?;
    Ok(config)
  }

  /// Read a config file. A missing file yields the defaults.
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    if !path.exists() {
      debug!(path = %path.display(), "no config file, using defaults");
      return Ok(Self::default());
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

    debug!(path = %path.display(), "loaded config file");
    Ok(config)
  }

  /// Apply `BUILDLENS_*` environment variable overrides.
  pub fn apply_env(&mut self) -> Result<(), ConfigError> {
    if let Some(root) = std::env::var_os(SDK_ROOT_VAR) {
      self.sdk_root = Some(PathBuf::from(root));
    }
    if let Some(tool) = std::env::var_os(BUILD_TOOL_VAR) {
      self.build_tool = Some(PathBuf::from(tool));
    }
    if let Some(dir) = std::env::var_os(TOOLCHAIN_DIR_VAR) {
      self.toolchain_dir = Some(PathBuf::from(dir));
    }
    if let Ok(value) = std::env::var(DIAGNOSTICS_VAR) {
      self.diagnostics = value.parse().map_err(|_| ConfigError::InvalidEnv {
        var: DIAGNOSTICS_VAR,
        value: value.clone(),
      })?;
    }
    if let Ok(value) = std::env::var(TELEMETRY_VAR) {
      self.telemetry = parse_bool(&value).ok_or(ConfigError::InvalidEnv {
        var: TELEMETRY_VAR,
        value,
      })?;
    }
    Ok(())
  }

  /// The build tool to invoke.
  ///
  /// An explicit `build_tool` wins, then `<sdk_root>/bin/waf`, then a bare
  /// name looked up on the search path.
  pub fn build_tool(&self) -> PathBuf {
    if let Some(tool) = &self.build_tool {
      return tool.clone();
    }
    match &self.sdk_root {
      Some(root) => root.join("bin").join(DEFAULT_BUILD_TOOL),
      None => PathBuf::from(DEFAULT_BUILD_TOOL),
    }
  }

  /// Directory searched for toolchain binaries before `PATH`.
  pub fn toolchain_dir(&self) -> Option<PathBuf> {
    self
      .toolchain_dir
      .clone()
      .or_else(|| self.sdk_root.as_ref().map(|root| root.join("toolchain").join("bin")))
  }
}

fn parse_bool(value: &str) -> Option<bool> {
  match value.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Some(true),
    "0" | "false" | "no" | "off" => Some(false),
    _ => None,
  }
}
