//! Server-wide limits applied to every request.
//!

use serde::{Deserialize, Serialize};

/// The default number of genotypes a single request may process.
pub const DEFAULT_MAX_GENOTYPES: u64 = 10_000_000;

/// Limits on query work and disclosure.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct Limits {
  max_genotypes: u64,
  min_group_size: usize,
}

impl Limits {
  /// Create new limits.
  pub fn new(max_genotypes: u64, min_group_size: usize) -> Self {
    Self {
      max_genotypes,
      min_group_size,
    }
  }

  /// Set the genotype ceiling.
  pub fn with_max_genotypes(mut self, max_genotypes: u64) -> Self {
    self.max_genotypes = max_genotypes;
    self
  }

  /// Set the minimum sample group size.
  pub fn with_min_group_size(mut self, min_group_size: usize) -> Self {
    self.min_group_size = min_group_size;
    self
  }

  /// Get the maximum number of genotypes processed by a request.
  pub fn max_genotypes(&self) -> u64 {
    self.max_genotypes
  }

  /// Get the minimum sample group size. Zero disables the check.
  pub fn min_group_size(&self) -> usize {
    self.min_group_size
  }

  /// Individual genotypes are never disclosed when a minimum group size is enforced.
  pub fn genotypes_allowed(&self) -> bool {
    self.min_group_size == 0
  }
}

impl Default for Limits {
  fn default() -> Self {
    Self {
      max_genotypes: DEFAULT_MAX_GENOTYPES,
      min_group_size: 0,
    }
  }
}
