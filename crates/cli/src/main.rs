mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use buildlens_lib::build::Operation;

use crate::cmd::GlobalArgs;
use crate::output::{OutputFormat, print_error};

/// blens - build front-end for SDK app projects
#[derive(Parser)]
#[command(name = "blens")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  debug: bool,

  #[command(flatten)]
  global: GlobalArgs,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the project and report app metrics
  Build {
    /// Cancel the build after this long (e.g., "90s", "10m")
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Remove all build outputs
  Clean {
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show per-section sizes of built artifacts
  AnalyzeSize {
    /// Artifact to analyze (default: the artifact of every target platform)
    artifact: Option<PathBuf>,

    /// One line per section, even with --verbose
    #[arg(long)]
    summary: bool,

    /// List every symbol in each section
    #[arg(short, long)]
    verbose: bool,
  },

  /// Show the resolved configuration
  Info {
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(if cli.debug { "debug" } else { "info" }));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = match &cli.command {
    Commands::Build { timeout, output } => cmd::cmd_build(Operation::Build, *timeout, &cli.global, *output),
    Commands::Clean { output } => cmd::cmd_build(Operation::Clean, None, &cli.global, *output),
    Commands::AnalyzeSize {
      artifact,
      summary,
      verbose,
    } => cmd::cmd_analyze_size(artifact.as_deref(), *summary, *verbose, &cli.global),
    Commands::Info { output } => cmd::cmd_info(&cli.global, *output),
  };

  match result {
    Ok(code) => code,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}
