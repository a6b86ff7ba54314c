use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};

use buildlens_lib::report::{NmAnalyzer, RenderMode, render_sections, resolve_artifact_paths};
use buildlens_lib::tool::ToolResolver;

use super::{CommandStatus, GlobalArgs, tracked};

/// Print section sizes for `artifact`, or for every target platform's artifact.
pub fn cmd_analyze_size(artifact: Option<&Path>, summary: bool, verbose: bool, args: &GlobalArgs) -> Result<ExitCode> {
  let config = args.load_config()?;

  tracked("analyze-size", &config, |_| {
    let root = args.project_dir();
    let paths = resolve_artifact_paths(artifact, &root, &config.binary_name)?;

    let resolver = ToolResolver::from_config(&config).with_cwd(&root);
    let analyzer = NmAnalyzer::new(resolver, config.analyzer_tool.clone());
    let mode = RenderMode::from_flags(summary, verbose);

    let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    rt.block_on(render_sections(&analyzer, &paths, mode, &mut out))?;
    out.flush()?;

    Ok(CommandStatus::Success)
  })
}
