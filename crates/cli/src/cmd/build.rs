//! Implementation of `blens build` and `blens clean`.
//!
//! Both hand the project to the build orchestrator; only `build` collects
//! metrics afterwards.

use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use buildlens_lib::build::{BuildMetrics, BuildOrchestrator, BuildOutcome, Operation};
use buildlens_lib::exec::interrupted;
use buildlens_lib::project::Project;

use super::{CommandStatus, GlobalArgs, tracked};
use crate::output::{
  OutputFormat, format_bytes, format_duration, print_error, print_info, print_json, print_stat, print_success,
  print_warning,
};

#[derive(Serialize)]
struct BuildSummary<'a> {
  operation: &'a str,
  state: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  reason: Option<&'a str>,
  duration_ms: u128,
  #[serde(skip_serializing_if = "Option::is_none")]
  metrics: Option<&'a BuildMetrics>,
}

/// Run `operation` on the project, cancelled by Ctrl-C or after `timeout`.
pub fn cmd_build(operation: Operation, timeout: Option<Duration>, args: &GlobalArgs, output: OutputFormat) -> Result<ExitCode> {
  let config = args.load_config()?;

  tracked(operation.name(), &config, |telemetry| {
    let project = Project::open(&args.project_dir())?;
    let start = Instant::now();

    let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
    let mut orchestrator = BuildOrchestrator::new(&project, &config, telemetry);
    let outcome = rt
      .block_on(orchestrator.run_until(operation, || cancelled_or_timed_out(timeout)))
      .with_context(|| format!("{} failed", operation))?;

    let elapsed = start.elapsed();
    info!(%operation, state = ?orchestrator.state(), elapsed = ?elapsed, "finished");

    let (state, reason, metrics) = match &outcome {
      BuildOutcome::Succeeded { metrics } => ("succeeded", None, metrics.as_ref()),
      BuildOutcome::Failed(category) => ("failed", Some(category.reason()), None),
      BuildOutcome::Cancelled => ("cancelled", None, None),
    };

    if output.is_json() {
      print_json(&BuildSummary {
        operation: operation.name(),
        state,
        reason,
        duration_ms: elapsed.as_millis(),
        metrics,
      })?;
    } else {
      print_outcome(operation, &outcome, elapsed);
    }

    Ok(match outcome {
      BuildOutcome::Succeeded { .. } => CommandStatus::Success,
      BuildOutcome::Failed(category) => CommandStatus::Failed(category.reason()),
      BuildOutcome::Cancelled => CommandStatus::Cancelled,
    })
  })
}

async fn cancelled_or_timed_out(timeout: Option<Duration>) {
  match timeout {
    Some(limit) => {
      tokio::select! {
        _ = interrupted() => {}
        _ = tokio::time::sleep(limit) => {
          print_warning(&format!("Timed out after {}", humantime::format_duration(limit)));
        }
      }
    }
    None => interrupted().await,
  }
}

fn print_outcome(operation: Operation, outcome: &BuildOutcome, elapsed: Duration) {
  match outcome {
    BuildOutcome::Succeeded { metrics } => {
      println!();
      print_success(&format!("{} finished in {}", capitalize(operation.name()), format_duration(elapsed)));
      if let Some(metrics) = metrics {
        print_metrics(metrics);
      }
    }
    BuildOutcome::Failed(category) => print_error(&format!("{} failed: {}", capitalize(operation.name()), category)),
    BuildOutcome::Cancelled => print_warning(&format!("{} cancelled", capitalize(operation.name()))),
  }
}

fn print_metrics(metrics: &BuildMetrics) {
  print_stat("Native source lines", &metrics.line_counts.c_line_count.to_string());
  if metrics.has_js {
    print_stat("Script source lines", &metrics.line_counts.js_line_count.to_string());
  }

  let counts = &metrics.resource_usage.resource_counts;
  let sizes = &metrics.resource_usage.resource_sizes;
  if counts.raw + counts.image + counts.font > 0 {
    print_stat(
      "Resources",
      &format!(
        "{} raw ({}), {} image ({}), {} font ({})",
        counts.raw,
        format_bytes(sizes.raw),
        counts.image,
        format_bytes(sizes.image),
        counts.font,
        format_bytes(sizes.font)
      ),
    );
  }

  if metrics.memory_usage.is_empty() {
    return;
  }
  println!();
  print_info("Memory usage");
  for (platform, usage) in &metrics.memory_usage {
    print_stat(
      platform,
      &format!("text {} / data {} / bss {}", usage.text, usage.data, usage.bss),
    );
  }
}

fn capitalize(word: &str) -> String {
  let mut chars = word.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}
