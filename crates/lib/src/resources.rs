//! Resource usage from generated build outputs.
//!
//! Every resource declared in the project descriptor must map to exactly one
//! generated file under `build/resources/<source dir>/`. Raw resources are
//! copied verbatim, so the generated name equals the declared name. Other
//! kinds get a suffix appended (`logo.png.pbi`, `font.ttf.pfo`), so the
//! generated name starts with the declared name but is never equal to it.
//!
//! Candidates are considered in byte-wise file name order; the first match
//! wins.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::RESOURCES_BUILD_DIR;

#[derive(Debug, Error)]
pub enum ResourceError {
  #[error("unsupported resource type {kind} for {file}")]
  UnsupportedResourceType { kind: String, file: String },

  #[error("could not find generated resource corresponding to {file}")]
  ResourceNotFound { file: String },

  #[error("failed to read {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

impl ResourceError {
  /// Errors that mean the descriptor and the build outputs disagree, as
  /// opposed to the output tree merely being unreadable.
  pub fn is_fatal(&self) -> bool {
    matches!(self, Self::UnsupportedResourceType { .. } | Self::ResourceNotFound { .. })
  }
}

/// A resource entry from the project descriptor's `resources.media` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
  #[serde(rename = "type")]
  pub kind: String,
  pub file: String,
}

/// Aggregation class for resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
  Raw,
  Image,
  Font,
}

impl ResourceClass {
  /// Map a declared kind to its class.
  pub fn from_kind(kind: &str) -> Option<Self> {
    match kind {
      "png" | "png-trans" => Some(Self::Image),
      "font" => Some(Self::Font),
      "raw" => Some(Self::Raw),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Raw => "raw",
      Self::Image => "image",
      Self::Font => "font",
    }
  }
}

impl fmt::Display for ResourceClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// One number per resource class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassTotals {
  pub raw: u64,
  pub image: u64,
  pub font: u64,
}

impl ClassTotals {
  pub fn get(&self, class: ResourceClass) -> u64 {
    match class {
      ResourceClass::Raw => self.raw,
      ResourceClass::Image => self.image,
      ResourceClass::Font => self.font,
    }
  }

  fn add(&mut self, class: ResourceClass, amount: u64) {
    match class {
      ResourceClass::Raw => self.raw += amount,
      ResourceClass::Image => self.image += amount,
      ResourceClass::Font => self.font += amount,
    }
  }
}

/// Count and aggregate byte size of generated resources, per class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceUsage {
  pub resource_counts: ClassTotals,
  pub resource_sizes: ClassTotals,
}

/// Match each descriptor to its generated file under `build_dir`.
pub fn scan_resources(descriptors: &[ResourceDescriptor], build_dir: &Path) -> Result<ResourceUsage, ResourceError> {
  let mut usage = ResourceUsage::default();

  for descriptor in descriptors {
    let class = ResourceClass::from_kind(&descriptor.kind).ok_or_else(|| ResourceError::UnsupportedResourceType {
      kind: descriptor.kind.clone(),
      file: descriptor.file.clone(),
    })?;

    let size = generated_size(descriptor, class, build_dir)?;
    debug!(file = %descriptor.file, %class, size, "matched generated resource");

    usage.resource_counts.add(class, 1);
    usage.resource_sizes.add(class, size);
  }

  Ok(usage)
}

fn generated_size(descriptor: &ResourceDescriptor, class: ResourceClass, build_dir: &Path) -> Result<u64, ResourceError> {
  let not_found = || ResourceError::ResourceNotFound {
    file: descriptor.file.clone(),
  };

  let declared = Path::new(&descriptor.file);
  let file_name = declared.file_name().ok_or_else(not_found)?;
  let mut search_dir = build_dir.join(RESOURCES_BUILD_DIR);
  if let Some(parent) = declared.parent() {
    search_dir.push(parent);
  }

  let mut names = match list_names(&search_dir) {
    Ok(names) => names,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
    Err(source) => return Err(ResourceError::Io { path: search_dir, source }),
  };
  names.sort();

  for name in names {
    if !is_generated_from(&name, file_name, class) {
      continue;
    }
    let path = search_dir.join(&name);
    match std::fs::metadata(&path) {
      Ok(metadata) if metadata.is_file() => return Ok(metadata.len()),
      Ok(_) => {}
      Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable candidate"),
    }
  }

  Err(not_found())
}

fn list_names(dir: &Path) -> io::Result<Vec<OsString>> {
  std::fs::read_dir(dir)?
    .map(|entry| entry.map(|e| e.file_name()))
    .collect()
}

fn is_generated_from(candidate: &OsString, declared: &std::ffi::OsStr, class: ResourceClass) -> bool {
  if class == ResourceClass::Raw {
    return candidate == declared;
  }
  candidate != declared && candidate.as_encoded_bytes().starts_with(declared.as_encoded_bytes())
}
