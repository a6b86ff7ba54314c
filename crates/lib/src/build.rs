//! Build orchestration.
//!
//! One run moves through `Idle → Running → {Succeeded, Failed, Cancelled}`:
//!
//! 1. The build tool is resolved; a missing tool fails immediately.
//! 2. The tool runs with the terminal attached (or with stderr teed).
//! 3. On a nonzero exit the failure is classified, re-running the tool with
//!    captured output unless stderr was already teed. A child that died from
//!    an interrupt is reported as cancelled and never re-run.
//! 4. After a successful `build`, metrics are collected and a single
//!    `app_build_succeeded` telemetry event is emitted.
//!
//! Metrics problems never turn a successful build into a failed one, with
//! one exception: a declared resource that has no generated counterpart, or
//! has an unknown type, means the artifact disagrees with the project
//! descriptor and is reported as [`BuildError::Resource`].

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::classify::{FailureCategory, classify, diagnose_until};
use crate::config::{Config, DiagnosticsMode};
use crate::consts::BUILD_SUCCEEDED_EVENT;
use crate::exec::{ExecError, ExecutionOutcome, Invocation, interrupted, run_tee_until, run_transparent_until};
use crate::lines::{LineCountError, LineCountReport, project_line_counts};
use crate::project::{Project, ProjectError};
use crate::resources::{ResourceError, ResourceUsage, scan_resources};
use crate::size::{MemoryUsage, memory_usage};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::tool::ToolResolver;

#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Resource(#[from] ResourceError),

  #[error(transparent)]
  Exec(#[from] ExecError),
}

/// Non-fatal problems while collecting post-build metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
  #[error("failed to read project descriptor: {0}")]
  Descriptor(#[from] ProjectError),

  #[error("failed to count source lines: {0}")]
  LineCount(#[from] LineCountError),

  #[error(transparent)]
  Resource(#[from] ResourceError),
}

/// What the build tool is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  Build,
  Clean,
}

impl Operation {
  pub fn name(&self) -> &'static str {
    match self {
      Self::Build => "build",
      Self::Clean => "clean",
    }
  }

  /// Arguments passed to the build tool.
  pub fn tool_args(&self) -> &'static [&'static str] {
    match self {
      Self::Build => &["configure", "build"],
      Self::Clean => &["distclean"],
    }
  }
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
  Idle,
  Running,
  Succeeded,
  Failed,
  Cancelled,
}

/// Metrics reported after a successful build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildMetrics {
  pub has_js: bool,
  pub line_counts: LineCountReport,
  pub resource_usage: ResourceUsage,
  /// Keyed by target platform. Platforms whose size could not be read are absent.
  pub memory_usage: BTreeMap<String, MemoryUsage>,
}

impl BuildMetrics {
  pub fn to_event(&self) -> TelemetryEvent {
    TelemetryEvent::new(BUILD_SUCCEEDED_EVENT)
      .with("has_js", self.has_js)
      .with("line_counts", self.line_counts)
      .with("resource_usage", &self.resource_usage)
      .with("memory_usage", &self.memory_usage)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
  /// The tool exited 0. `metrics` is set only for a `build` whose metrics
  /// could be collected.
  Succeeded { metrics: Option<BuildMetrics> },
  Failed(FailureCategory),
  Cancelled,
}

pub struct BuildOrchestrator<'a> {
  project: &'a Project,
  config: &'a Config,
  telemetry: &'a dyn TelemetrySink,
  resolver: ToolResolver,
  state: BuildState,
}

impl<'a> BuildOrchestrator<'a> {
  pub fn new(project: &'a Project, config: &'a Config, telemetry: &'a dyn TelemetrySink) -> Self {
    Self {
      project,
      config,
      telemetry,
      resolver: ToolResolver::from_config(config).with_cwd(project.root()),
      state: BuildState::Idle,
    }
  }

  pub fn state(&self) -> BuildState {
    self.state
  }

  /// Run `operation`, cancelled by Ctrl-C.
  pub async fn run(&mut self, operation: Operation) -> Result<BuildOutcome, BuildError> {
    self.run_until(operation, interrupted).await
  }

  /// Run `operation`; each child process is cancelled when the future
  /// produced by `cancel` resolves.
  pub async fn run_until<F, C>(&mut self, operation: Operation, mut cancel: F) -> Result<BuildOutcome, BuildError>
  where
    F: FnMut() -> C,
    C: Future<Output = ()>,
  {
    self.state = BuildState::Running;

    let tool = match self.resolver.resolve(self.config.build_tool()) {
      Ok(tool) => tool,
      Err(e) => {
        return Ok(self.fail(FailureCategory::ToolNotFound {
          tool: e.tool().to_string(),
        }));
      }
    };

    let invocation = Invocation::new(tool, self.project.root())
      .args(operation.tool_args().iter().copied())
      .with_search_path(self.resolver.search_path());

    let run = match self.config.diagnostics {
      DiagnosticsMode::Rerun => run_transparent_until(&invocation, cancel()).await,
      DiagnosticsMode::Tee => run_tee_until(&invocation, cancel()).await,
    };

    let outcome = match run {
      Ok(outcome) => outcome,
      Err(e) => return self.handle_exec_error(e),
    };

    if !outcome.success() {
      let category = match self.classify_failure(&invocation, &outcome, cancel()).await {
        Ok(category) => category,
        Err(e) => return self.handle_exec_error(e),
      };
      return Ok(self.fail(category));
    }

    self.state = BuildState::Succeeded;
    info!(operation = %operation, "build tool succeeded");

    if operation != Operation::Build {
      return Ok(BuildOutcome::Succeeded { metrics: None });
    }

    let metrics = match self.collect_metrics().await {
      Ok(metrics) => {
        self.telemetry.emit(&metrics.to_event());
        Some(metrics)
      }
      Err(MetricsError::Resource(e)) if e.is_fatal() => return Err(BuildError::Resource(e)),
      Err(e) => {
        error!("Exception occurred collecting app analytics: {}", e);
        debug!(error = ?e, "metrics collection failure");
        None
      }
    };

    Ok(BuildOutcome::Succeeded { metrics })
  }

  async fn classify_failure<C>(
    &self,
    invocation: &Invocation,
    outcome: &ExecutionOutcome,
    cancel: C,
  ) -> Result<FailureCategory, ExecError>
  where
    C: Future<Output = ()>,
  {
    match self.config.diagnostics {
      DiagnosticsMode::Tee => Ok(classify(outcome.diagnostics())),
      DiagnosticsMode::Rerun => diagnose_until(invocation, &self.resolver, cancel).await,
    }
  }

  fn handle_exec_error(&mut self, e: ExecError) -> Result<BuildOutcome, BuildError> {
    match e {
      ExecError::Cancelled { .. } => {
        self.state = BuildState::Cancelled;
        info!("build cancelled");
        Ok(BuildOutcome::Cancelled)
      }
      ExecError::Spawn { program, .. } => Ok(self.fail(FailureCategory::ToolNotFound { tool: program })),
      other => {
        self.state = BuildState::Failed;
        Err(BuildError::Exec(other))
      }
    }
  }

  fn fail(&mut self, category: FailureCategory) -> BuildOutcome {
    self.state = BuildState::Failed;
    debug!(reason = category.reason(), "build failed");
    BuildOutcome::Failed(category)
  }

  /// Line counts, resource usage and per-platform memory usage.
  pub async fn collect_metrics(&self) -> Result<BuildMetrics, MetricsError> {
    let info = self.project.app_info()?;
    let resource_usage = scan_resources(&info.resources.media, &self.project.build_dir())?;
    let line_counts = project_line_counts(&self.project.source_dir())?;

    let mut usage = BTreeMap::new();
    for platform in &info.target_platforms {
      let artifact = self.project.artifact_path(platform, &self.config.binary_name);
      if let Some(memory) = memory_usage(&self.resolver, &self.config.size_tool, &artifact).await {
        usage.insert(platform.clone(), memory);
      }
    }

    Ok(BuildMetrics {
      has_js: self.project.has_script_sources(),
      line_counts,
      resource_usage,
      memory_usage: usage,
    })
  }
}
