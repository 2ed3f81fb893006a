//! Configuration of the BGT collection served by this instance.
//!

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The files making up the collection. Each entry is a file prefix, and the prefix basename
/// becomes the panel name reported to clients.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct CollectionConfig {
  files: Vec<PathBuf>,
  variant_annotations: Option<PathBuf>,
}

impl CollectionConfig {
  /// Create a new collection config.
  pub fn new(files: Vec<PathBuf>, variant_annotations: Option<PathBuf>) -> Self {
    Self {
      files,
      variant_annotations,
    }
  }

  /// Get the file prefixes.
  pub fn files(&self) -> &[PathBuf] {
    &self.files
  }

  /// Get the variant annotation database path.
  pub fn variant_annotations(&self) -> Option<&Path> {
    self.variant_annotations.as_deref()
  }

  pub(crate) fn set_files(&mut self, files: Vec<PathBuf>) {
    self.files = files;
  }

  pub(crate) fn set_variant_annotations(&mut self, path: PathBuf) {
    self.variant_annotations = Some(path);
  }
}
