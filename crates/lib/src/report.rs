//! Per-section size reports for built artifacts.
//!
//! Symbol analysis is delegated to a [`SectionAnalyzer`]. The bundled
//! [`NmAnalyzer`] runs the toolchain's `nm` and groups symbols into `.text`,
//! `.data` and `.bss` by their type letter.

use std::collections::BTreeMap;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::consts::PROJECT_DESCRIPTOR;
use crate::exec::{ExecError, Invocation, run_captured};
use crate::project::{AppInfo, ProjectError, artifact_path};
use crate::tool::{ToolError, ToolResolver};

#[derive(Debug, Error)]
pub enum AnalyzeError {
  #[error(transparent)]
  Tool(#[from] ToolError),

  #[error(transparent)]
  Exec(#[from] ExecError),

  #[error("{command} failed with exit code {status:?}: {stderr}")]
  Failed {
    command: String,
    status: Option<i32>,
    stderr: String,
  },
}

#[derive(Debug, Error)]
pub enum ReportError {
  #[error("unable to read targetPlatforms from {}. Please specify a valid artifact path.", PROJECT_DESCRIPTOR)]
  NoArtifacts {
    #[source]
    source: Option<ProjectError>,
  },

  #[error("failed to analyze {}: {source}", .path.display())]
  Analyze {
    path: PathBuf,
    #[source]
    source: AnalyzeError,
  },

  #[error("failed to write report: {0}")]
  Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
  pub name: String,
  pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
  pub size: u64,
  /// Largest first.
  pub symbols: Vec<Symbol>,
}

/// Section name to section contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionReport {
  pub sections: BTreeMap<String, Section>,
}

impl SectionReport {
  fn add(&mut self, section: &str, symbol: Symbol) {
    let entry = self.sections.entry(section.to_string()).or_default();
    entry.size += symbol.size;
    entry.symbols.push(symbol);
  }

  fn sort_symbols(&mut self) {
    for section in self.sections.values_mut() {
      section
        .symbols
        .sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.name.cmp(&b.name)));
    }
  }
}

/// Produces a [`SectionReport`] for an artifact.
pub trait SectionAnalyzer {
  fn analyze(&self, artifact: &Path) -> impl Future<Output = Result<SectionReport, AnalyzeError>>;
}

/// Analyzer backed by `nm --print-size --size-sort`.
#[derive(Debug, Clone)]
pub struct NmAnalyzer {
  resolver: ToolResolver,
  tool: String,
}

impl NmAnalyzer {
  pub fn new(resolver: ToolResolver, tool: impl Into<String>) -> Self {
    Self {
      resolver,
      tool: tool.into(),
    }
  }
}

impl SectionAnalyzer for NmAnalyzer {
  fn analyze(&self, artifact: &Path) -> impl Future<Output = Result<SectionReport, AnalyzeError>> {
    let artifact = artifact.to_path_buf();
    async move {
      let tool = self.resolver.resolve(&self.tool)?;
      let invocation = Invocation::new(tool, self.resolver.cwd())
        .args(["--print-size", "--size-sort"])
        .arg(artifact.display().to_string())
        .with_search_path(self.resolver.search_path());

      let outcome = run_captured(&invocation).await?;
      if !outcome.success() {
        return Err(AnalyzeError::Failed {
          command: invocation.to_string(),
          status: outcome.status,
          stderr: outcome.diagnostics().trim().to_string(),
        });
      }

      Ok(parse_nm_output(outcome.stdout.as_deref().unwrap_or("")))
    }
  }
}

/// Section a symbol type letter belongs to, if it is one we report.
fn section_for(kind: &str) -> Option<&'static str> {
  match kind {
    "t" | "T" => Some(".text"),
    "d" | "D" => Some(".data"),
    "b" | "B" => Some(".bss"),
    _ => None,
  }
}

/// Parse `nm --print-size` output: `<address> <size> <type> <name>`.
///
/// Lines without a size (undefined or absolute symbols) are skipped.
pub fn parse_nm_output(output: &str) -> SectionReport {
  let mut report = SectionReport::default();

  for line in output.lines() {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [_, size, kind, name, ..] = fields.as_slice() else {
      continue;
    };
    let Some(section) = section_for(kind) else {
      continue;
    };
    let Ok(size) = u64::from_str_radix(size, 16) else {
      debug!(line, "skipping unparseable nm line");
      continue;
    };

    report.add(
      section,
      Symbol {
        name: name.to_string(),
        size,
      },
    );
  }

  report.sort_symbols();
  report
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
  /// One line per section.
  #[default]
  Summary,
  /// Each section followed by its symbols.
  Verbose,
}

impl RenderMode {
  /// `--summary` wins over `--verbose`.
  pub fn from_flags(summary: bool, verbose: bool) -> Self {
    if verbose && !summary { Self::Verbose } else { Self::Summary }
  }
}

/// Artifacts to analyze: the explicit path, or one per target platform.
pub fn resolve_artifact_paths(
  explicit: Option<&Path>,
  project_root: &Path,
  binary_name: &str,
) -> Result<Vec<PathBuf>, ReportError> {
  if let Some(path) = explicit {
    return Ok(vec![path.to_path_buf()]);
  }

  let info = AppInfo::from_file(&project_root.join(PROJECT_DESCRIPTOR))
    .map_err(|source| ReportError::NoArtifacts { source: Some(source) })?;

  if info.target_platforms.is_empty() {
    return Err(ReportError::NoArtifacts { source: None });
  }

  Ok(
    info
      .target_platforms
      .iter()
      .map(|platform| artifact_path(project_root, platform, binary_name))
      .collect(),
  )
}

/// Write one artifact's report.
pub fn render_report<W: Write>(out: &mut W, artifact: &Path, report: &SectionReport, mode: RenderMode) -> io::Result<()> {
  writeln!(out)?;
  writeln!(out, "======{}======", artifact.display())?;

  for (name, section) in &report.sections {
    writeln!(
      out,
      "{}: {} bytes ({} symbols)",
      name,
      section.size,
      section.symbols.len()
    )?;

    if mode == RenderMode::Verbose {
      for symbol in &section.symbols {
        writeln!(out, "  {:>8}\t{}", symbol.size, symbol.name)?;
      }
    }
  }

  Ok(())
}

/// Analyze and render every artifact in `paths`, in order.
pub async fn render_sections<A, W>(analyzer: &A, paths: &[PathBuf], mode: RenderMode, out: &mut W) -> Result<(), ReportError>
where
  A: SectionAnalyzer,
  W: Write,
{
  for path in paths {
    let report = analyzer.analyze(path).await.map_err(|source| ReportError::Analyze {
      path: path.clone(),
      source,
    })?;
    render_report(out, path, &report, mode)?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::write_file;
  use tempfile::TempDir;

  const NM_OUTPUT: &str = "\
         U __aeabi_uidiv
00000010 00000004 b s_counter
00000000 00000010 D app_name
00000020 00000040 T main
00000060 00000008 t helper
00000070 00000200 B s_buffer
00000300 00000002 r rodata_const
";

  fn sample_report() -> SectionReport {
    parse_nm_output(NM_OUTPUT)
  }

  struct FixedAnalyzer(SectionReport);

  impl SectionAnalyzer for FixedAnalyzer {
    fn analyze(&self, _artifact: &Path) -> impl Future<Output = Result<SectionReport, AnalyzeError>> {
      std::future::ready(Ok(self.0.clone()))
    }
  }

  #[test]
  fn groups_symbols_by_section() {
    let report = sample_report();

    assert_eq!(report.sections.len(), 3);
    assert_eq!(report.sections[".text"].size, 0x48);
    assert_eq!(report.sections[".data"].size, 0x10);
    assert_eq!(report.sections[".bss"].size, 0x204);
    assert_eq!(report.sections[".bss"].symbols[0].name, "s_buffer");
  }

  #[test]
  fn skips_sizeless_and_unreported_symbols() {
    let report = sample_report();
    let names: Vec<_> = report
      .sections
      .values()
      .flat_map(|s| s.symbols.iter().map(|sym| sym.name.as_str()))
      .collect();
    assert!(!names.contains(&"__aeabi_uidiv"));
    assert!(!names.contains(&"rodata_const"));
  }

  #[test]
  fn summary_is_one_line_per_section() {
    let mut out = Vec::new();
    render_report(&mut out, Path::new("build/basalt/app.elf"), &sample_report(), RenderMode::Summary).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(
      text,
      "\n======build/basalt/app.elf======\n.bss: 516 bytes (2 symbols)\n.data: 16 bytes (1 symbols)\n.text: 72 bytes (2 symbols)\n"
    );
  }

  #[test]
  fn verbose_lists_symbols() {
    let mut out = Vec::new();
    render_report(&mut out, Path::new("app.elf"), &sample_report(), RenderMode::Verbose).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("       64\tmain\n"));
    assert!(text.contains("      512\ts_buffer\n"));
  }

  #[test]
  fn summary_flag_wins() {
    assert_eq!(RenderMode::from_flags(true, true), RenderMode::Summary);
    assert_eq!(RenderMode::from_flags(false, true), RenderMode::Verbose);
    assert_eq!(RenderMode::from_flags(false, false), RenderMode::Summary);
  }

  #[test]
  fn explicit_path_needs_no_project() {
    let temp = TempDir::new().unwrap();
    let paths = resolve_artifact_paths(Some(Path::new("/tmp/app.elf")), temp.path(), "app.elf").unwrap();
    assert_eq!(paths, vec![PathBuf::from("/tmp/app.elf")]);
  }

  #[test]
  fn platforms_imply_artifact_paths() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), PROJECT_DESCRIPTOR, r#"{ "targetPlatforms": ["aplite", "basalt"] }"#);

    let paths = resolve_artifact_paths(None, temp.path(), "app.elf").unwrap();

    assert_eq!(
      paths,
      vec![
        temp.path().join("build/aplite/app.elf"),
        temp.path().join("build/basalt/app.elf")
      ]
    );
  }

  #[test]
  fn no_path_and_no_descriptor_is_an_error() {
    let temp = TempDir::new().unwrap();
    let err = resolve_artifact_paths(None, temp.path(), "app.elf").unwrap_err();
    assert!(err.to_string().contains("Please specify a valid artifact path"));
  }

  #[test]
  fn descriptor_without_platforms_is_an_error() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join(PROJECT_DESCRIPTOR), "{}").unwrap();

    let err = resolve_artifact_paths(None, temp.path(), "app.elf").unwrap_err();

    assert!(matches!(err, ReportError::NoArtifacts { source: None }));
  }

  #[tokio::test]
  async fn renders_every_artifact_in_order() {
    let analyzer = FixedAnalyzer(sample_report());
    let paths = vec![PathBuf::from("a.elf"), PathBuf::from("b.elf")];
    let mut out = Vec::new();

    render_sections(&analyzer, &paths, RenderMode::Summary, &mut out).await.unwrap();

    let text = String::from_utf8(out).unwrap();
    let a = text.find("======a.elf======").unwrap();
    let b = text.find("======b.elf======").unwrap();
    assert!(a < b);
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn nm_analyzer_runs_tool() {
    use crate::util::testutil::fake_tool;

    let temp = TempDir::new().unwrap();
    fake_tool(
      temp.path(),
      "fake-nm",
      &format!("[ \"$1 $2\" = \"--print-size --size-sort\" ] || exit 2\ncat <<'EOF'\n{}EOF", NM_OUTPUT),
    );
    let analyzer = NmAnalyzer::new(ToolResolver::new().with_dir(temp.path()), "fake-nm");

    let report = analyzer.analyze(Path::new("app.elf")).await.unwrap();

    assert_eq!(report, sample_report());
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn nm_analyzer_reports_tool_failure() {
    use crate::util::testutil::fake_tool;

    let temp = TempDir::new().unwrap();
    fake_tool(temp.path(), "fake-nm", "echo \"fake-nm: '$3': No such file\" >&2; exit 1");
    let analyzer = NmAnalyzer::new(ToolResolver::new().with_dir(temp.path()), "fake-nm");

    let err = analyzer.analyze(Path::new("missing.elf")).await.unwrap_err();

    assert!(matches!(err, AnalyzeError::Failed { ref stderr, .. } if stderr.contains("No such file")));
  }
}
