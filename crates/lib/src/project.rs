//! Project directory detection and descriptor loading.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{BUILD_DIR, LEGACY_RESOURCE_MAP, PROJECT_DESCRIPTOR, SCRIPT_SOURCE_DIR, SOURCE_DIR};
use crate::resources::ResourceDescriptor;

#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("this command must be run from a project directory ({} not found in {})", PROJECT_DESCRIPTOR, .path.display())]
  NotAProject { path: PathBuf },

  #[error("the project at {} uses an outdated layout; convert it to the current SDK format first", .path.display())]
  Outdated { path: PathBuf },

  #[error("failed to read {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {}: {source}", .path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

/// The parts of the project descriptor this tool consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppInfo {
  pub target_platforms: Vec<String>,
  pub resources: Resources,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resources {
  pub media: Vec<ResourceDescriptor>,
}

impl AppInfo {
  pub fn from_file(path: &Path) -> Result<Self, ProjectError> {
    let content = std::fs::read_to_string(path).map_err(|source| ProjectError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_str(&content).map_err(|source| ProjectError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }
}

/// A validated project root.
#[derive(Debug, Clone)]
pub struct Project {
  root: PathBuf,
}

impl Project {
  /// Open the project rooted at `root`.
  ///
  /// Fails if the descriptor is missing or the directory still uses the
  /// legacy resource layout.
  pub fn open(root: &Path) -> Result<Self, ProjectError> {
    let root = dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());

    if !root.join(PROJECT_DESCRIPTOR).is_file() {
      return Err(ProjectError::NotAProject { path: root });
    }
    if root.join(LEGACY_RESOURCE_MAP).exists() {
      return Err(ProjectError::Outdated { path: root });
    }

    debug!(root = %root.display(), "opened project");
    Ok(Self { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn descriptor_path(&self) -> PathBuf {
    self.root.join(PROJECT_DESCRIPTOR)
  }

  /// Read the descriptor fresh from disk.
  pub fn app_info(&self) -> Result<AppInfo, ProjectError> {
    AppInfo::from_file(&self.descriptor_path())
  }

  pub fn build_dir(&self) -> PathBuf {
    self.root.join(BUILD_DIR)
  }

  pub fn source_dir(&self) -> PathBuf {
    self.root.join(SOURCE_DIR)
  }

  /// Whether the project carries script sources alongside native ones.
  pub fn has_script_sources(&self) -> bool {
    self.root.join(SCRIPT_SOURCE_DIR).exists()
  }

  /// Conventional artifact location: `build/<platform>/<binary_name>`.
  pub fn artifact_path(&self, platform: &str, binary_name: &str) -> PathBuf {
    artifact_path(&self.root, platform, binary_name)
  }
}

/// Artifact path for `platform`, relative to `root`.
pub fn artifact_path(root: &Path, platform: &str, binary_name: &str) -> PathBuf {
  root.join(BUILD_DIR).join(platform).join(binary_name)
}
