mod analyze_size;
mod build;
mod info;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use buildlens_lib::config::{Config, DiagnosticsMode};
use buildlens_lib::telemetry::{TelemetrySink, command_failure, command_success, sink_from_config};

pub use analyze_size::cmd_analyze_size;
pub use build::cmd_build;
pub use info::cmd_info;

/// Exit code for a run interrupted by the user.
const CANCELLED_EXIT_CODE: u8 = 130;

/// Flags shared by every command. They override the config file and environment.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
  /// Project directory (default: current directory)
  #[arg(long, global = true, value_name = "DIR")]
  pub project_dir: Option<PathBuf>,

  /// SDK installation to use
  #[arg(long, global = true, value_name = "DIR")]
  pub sdk: Option<PathBuf>,

  /// Copy build tool errors to the terminal while capturing them, instead of re-running on failure
  #[arg(long, global = true)]
  pub tee_diagnostics: bool,

  /// Do not record telemetry for this run
  #[arg(long, global = true)]
  pub no_telemetry: bool,
}

impl GlobalArgs {
  /// Config file and environment, then these flags on top.
  pub fn load_config(&self) -> Result<Config> {
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(sdk) = &self.sdk {
      config.sdk_root = Some(sdk.clone());
    }
    if self.tee_diagnostics {
      config.diagnostics = DiagnosticsMode::Tee;
    }
    if self.no_telemetry {
      config.telemetry = false;
    }
    debug!(?config, "effective configuration");
    Ok(config)
  }

  pub fn project_dir(&self) -> PathBuf {
    self.project_dir.clone().unwrap_or_else(|| PathBuf::from("."))
  }
}

/// How a command ended, for telemetry and the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
  Success,
  /// Failed with a short telemetry reason.
  Failed(&'static str),
  Cancelled,
}

impl CommandStatus {
  fn exit_code(self) -> ExitCode {
    match self {
      Self::Success => ExitCode::SUCCESS,
      Self::Failed(_) => ExitCode::FAILURE,
      Self::Cancelled => ExitCode::from(CANCELLED_EXIT_CODE),
    }
  }
}

/// Run a command body and report its result as `cmd_success` or `cmd_fail`.
pub fn tracked<F>(command: &str, config: &Config, body: F) -> Result<ExitCode>
where
  F: FnOnce(&dyn TelemetrySink) -> Result<CommandStatus>,
{
  let telemetry = sink_from_config(config);

  let status = match body(telemetry.as_ref()) {
    Ok(status) => status,
    Err(e) => {
      telemetry.emit(&command_failure(command, &format!("unhandled error: {:#}", e)));
      return Err(e);
    }
  };

  match status {
    CommandStatus::Success => telemetry.emit(&command_success(command)),
    CommandStatus::Failed(reason) => telemetry.emit(&command_failure(command, reason)),
    CommandStatus::Cancelled => telemetry.emit(&command_failure(command, "cancelled")),
  }

  Ok(status.exit_code())
}
