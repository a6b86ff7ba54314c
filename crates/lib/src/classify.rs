//! Failure classification for build tool runs.
//!
//! Diagnostic text is matched against known markers, first match wins:
//! 1. the compiler version could not be determined → [`FailureCategory::MissingCompiler`]
//! 2. the app region overflowed → [`FailureCategory::ArtifactTooLarge`]
//! 3. anything else → [`FailureCategory::GenericBuildFailure`]
//!
//! A tool that cannot be started has no text to classify and is reported as
//! [`FailureCategory::ToolNotFound`].

use std::future::Future;

use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{MISSING_COMPILER_MARKER, REGION_OVERFLOW_MARKER};
use crate::exec::{ExecError, Invocation, interrupted, run_captured_until};
use crate::tool::ToolResolver;

/// Why a build failed, each implying a different remedy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureCategory {
  #[error("the executable {tool} could not be found")]
  ToolNotFound { tool: String },

  #[error("the compiler/linker tools could not be found; check that the SDK toolchain is installed")]
  MissingCompiler,

  #[error("the application is too large: the linker reported that the app region overflowed")]
  ArtifactTooLarge,

  #[error("a compilation error occurred; see the build output above")]
  GenericBuildFailure,
}

impl FailureCategory {
  /// Short reason string used in telemetry.
  pub fn reason(&self) -> &'static str {
    match self {
      Self::ToolNotFound { .. } => "tool not found",
      Self::MissingCompiler => "missing compiler/linker",
      Self::ArtifactTooLarge => "app too big",
      Self::GenericBuildFailure => "compilation error",
    }
  }
}

/// Classify captured diagnostic text.
pub fn classify(diagnostics: &str) -> FailureCategory {
  if diagnostics.contains(MISSING_COMPILER_MARKER) {
    FailureCategory::MissingCompiler
  } else if diagnostics.contains(REGION_OVERFLOW_MARKER) {
    FailureCategory::ArtifactTooLarge
  } else {
    FailureCategory::GenericBuildFailure
  }
}

/// Re-run a failed invocation with captured output and classify it.
///
/// Only call this after the transparent run has exited nonzero. The second
/// run may in principle behave differently from the first; the result is a
/// best-effort diagnosis of a failure that already happened.
pub async fn diagnose(invocation: &Invocation, resolver: &ToolResolver) -> Result<FailureCategory, ExecError> {
  diagnose_until(invocation, resolver, interrupted()).await
}

pub async fn diagnose_until<C>(
  invocation: &Invocation,
  resolver: &ToolResolver,
  cancel: C,
) -> Result<FailureCategory, ExecError>
where
  C: Future<Output = ()>,
{
  if let Err(e) = resolver.resolve(invocation.program()) {
    return Ok(FailureCategory::ToolNotFound {
      tool: e.tool().to_string(),
    });
  }

  info!("build failed, re-running to collect diagnostics");

  let outcome = match run_captured_until(invocation, cancel).await {
    Ok(outcome) => outcome,
    Err(ExecError::Spawn { program, source }) => {
      debug!(program = %program, error = %source, "diagnostic run could not start");
      return Ok(FailureCategory::ToolNotFound { tool: program });
    }
    Err(e) => return Err(e),
  };

  let category = classify(outcome.diagnostics());
  debug!(status = ?outcome.status, reason = category.reason(), "classified build failure");
  Ok(category)
}
