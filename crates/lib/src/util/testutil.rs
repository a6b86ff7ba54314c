//! Test utilities for buildlens-lib.
//!
//! External tools (build tool, size tool, nm) are simulated by small shell
//! scripts written into a temporary directory.

use std::fs;
use std::path::{Path, PathBuf};

/// Writes an executable `/bin/sh` script named `name` into `dir`.
///
/// Returns the full path of the script.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join(name);
  fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
  let mut perms = fs::metadata(&path).unwrap().permissions();
  perms.set_mode(0o755);
  fs::set_permissions(&path, perms).unwrap();
  path
}

/// Writes `content` to `relative` under `root`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
  let path = root.join(relative);
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(&path, content).unwrap();
  path
}

/// Writes a file of exactly `len` bytes.
pub fn write_sized(root: &Path, relative: &str, len: usize) -> PathBuf {
  write_file(root, relative, &"x".repeat(len))
}
