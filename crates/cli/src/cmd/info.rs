//! `blens info`: the configuration a build would run with.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use serde::Serialize;

use buildlens_lib::platform::paths::{config_file, data_dir};
use buildlens_lib::tool::ToolResolver;

use super::{CommandStatus, GlobalArgs, tracked};
use crate::output::{OutputFormat, print_info, print_json, print_stat, print_warning};

#[derive(Serialize)]
struct Info {
  version: &'static str,
  config_file: PathBuf,
  sdk_root: Option<PathBuf>,
  build_tool: PathBuf,
  build_tool_resolved: Option<PathBuf>,
  toolchain_dir: Option<PathBuf>,
  size_tool: String,
  analyzer_tool: String,
  diagnostics: String,
  telemetry: bool,
  data_dir: PathBuf,
}

pub fn cmd_info(args: &GlobalArgs, output: OutputFormat) -> Result<ExitCode> {
  let config = args.load_config()?;

  tracked("info", &config, |_| {
    let resolver = ToolResolver::from_config(&config).with_cwd(args.project_dir());
    let build_tool = config.build_tool();

    let info = Info {
      version: env!("CARGO_PKG_VERSION"),
      config_file: config_file(),
      sdk_root: config.sdk_root.clone(),
      build_tool_resolved: resolver.resolve(&build_tool).ok(),
      build_tool,
      toolchain_dir: config.toolchain_dir(),
      size_tool: config.size_tool.clone(),
      analyzer_tool: config.analyzer_tool.clone(),
      diagnostics: config.diagnostics.to_string(),
      telemetry: config.telemetry,
      data_dir: data_dir(),
    };

    if output.is_json() {
      print_json(&info)?;
      return Ok(CommandStatus::Success);
    }

    print_info(&format!("blens v{}", info.version));
    println!();
    print_stat("Config file", &info.config_file.display().to_string());
    print_stat("SDK root", &display_or_unset(info.sdk_root.as_ref()));
    match &info.build_tool_resolved {
      Some(path) => print_stat("Build tool", &path.display().to_string()),
      None => print_stat("Build tool", &format!("{} (not found)", info.build_tool.display())),
    }
    print_stat("Toolchain dir", &display_or_unset(info.toolchain_dir.as_ref()));
    print_stat("Size tool", &info.size_tool);
    print_stat("Analyzer tool", &info.analyzer_tool);
    print_stat("Diagnostics", &info.diagnostics);
    print_stat("Telemetry", if info.telemetry { "enabled" } else { "disabled" });

    if info.build_tool_resolved.is_none() {
      println!();
      print_warning("Builds will fail until the build tool is installed or --sdk points at an SDK.");
    }

    Ok(CommandStatus::Success)
  })
}

fn display_or_unset(path: Option<&PathBuf>) -> String {
  path.map(|p| p.display().to_string()).unwrap_or_else(|| "(unset)".to_string())
}
