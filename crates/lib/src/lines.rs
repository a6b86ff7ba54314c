//! Source line counting for project-size telemetry.
//!
//! Entries whose name starts with `.` are skipped, directories included.
//! Symlinked directories are never entered. Symlinked files are counted when
//! they resolve to a regular file; dangling links are skipped.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Extensions counted as native sources.
pub const NATIVE_EXTENSIONS: &[&str] = &["c", "h"];

/// Extensions counted as script sources.
pub const SCRIPT_EXTENSIONS: &[&str] = &["js"];

#[derive(Debug, Error)]
pub enum LineCountError {
  #[error("failed to walk {}: {source}", .path.display())]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("failed to read {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Line counts per source category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LineCountReport {
  pub c_line_count: u64,
  pub js_line_count: u64,
}

/// Count native and script lines under `source_dir`.
///
/// A missing directory counts as zero lines.
pub fn project_line_counts(source_dir: &Path) -> Result<LineCountReport, LineCountError> {
  if !source_dir.is_dir() {
    debug!(path = %source_dir.display(), "no source directory, reporting zero lines");
    return Ok(LineCountReport::default());
  }

  Ok(LineCountReport {
    c_line_count: count_lines(source_dir, NATIVE_EXTENSIONS)?,
    js_line_count: count_lines(source_dir, SCRIPT_EXTENSIONS)?,
  })
}

/// Total lines in files under `root` whose extension is in `extensions`.
///
/// Extensions may be given with or without the leading dot.
pub fn count_lines(root: &Path, extensions: &[&str]) -> Result<u64, LineCountError> {
  let extensions: Vec<&str> = extensions.iter().map(|e| e.trim_start_matches('.')).collect();
  let mut total = 0;

  let walker = WalkDir::new(root)
    .follow_links(false)
    .into_iter()
    .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

  for entry in walker {
    let entry = entry.map_err(|source| LineCountError::Walk {
      path: root.to_path_buf(),
      source,
    })?;

    if !matches_extension(entry.path(), &extensions) || !is_countable_file(&entry) {
      continue;
    }

    let lines = file_lines(entry.path())?;
    debug!(path = %entry.path().display(), lines, "counted");
    total += lines;
  }

  Ok(total)
}

fn is_hidden(entry: &DirEntry) -> bool {
  entry.file_name().as_encoded_bytes().starts_with(b".")
}

fn matches_extension(path: &Path, extensions: &[&str]) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|ext| extensions.contains(&ext))
}

fn is_countable_file(entry: &DirEntry) -> bool {
  let file_type = entry.file_type();
  if file_type.is_file() {
    return true;
  }
  if file_type.is_symlink() {
    return match std::fs::metadata(entry.path()) {
      Ok(target) => target.is_file(),
      Err(e) => {
        debug!(path = %entry.path().display(), error = %e, "skipping dangling symlink");
        false
      }
    };
  }
  false
}

/// Number of lines, counting a final line without a trailing newline.
fn file_lines(path: &Path) -> Result<u64, LineCountError> {
  let bytes = std::fs::read(path).map_err(|source| LineCountError::Read {
    path: path.to_path_buf(),
    source,
  })?;

  let newlines = bytes.iter().filter(|&&b| b == b'\n').count() as u64;
  let unterminated = bytes.last().is_some_and(|&b| b != b'\n');
  Ok(newlines + u64::from(unterminated))
}
