//! Lists samples from their annotations alone, without reading genotypes.
//!

use std::fmt::Write;

use bgt_config::types::{BgtError, Result};
use bgt_storage::Store;
use bgt_storage::expr::Expr;
use tracing::instrument;

/// List every sample of every file as `name<TAB>file` lines, in file then row order, keeping the
/// samples whose annotations pass `filter`. File numbers are 1-based.
#[instrument(level = "debug", skip(store), err)]
pub fn list_samples(store: &impl Store, filter: Option<&str>) -> Result<String> {
  let filter = filter
    .map(str::parse::<Expr>)
    .transpose()
    .map_err(|err| BgtError::invalid_input(err.to_string()))?;

  let mut out = String::new();
  for file in 0..store.file_count() {
    let Some(samples) = store.sample_annotations(file) else {
      continue;
    };

    for (row, sample) in samples.rows().iter().enumerate() {
      if filter
        .as_ref()
        .is_none_or(|filter| samples.test(row, filter))
      {
        let _ = writeln!(out, "{}\t{}", sample.name(), file + 1);
      }
    }
  }

  Ok(out)
}

#[cfg(test)]
mod tests {
  use bgt_test::util::test_store;

  use super::*;

  #[test]
  fn list_every_sample() {
    assert_eq!(
      list_samples(&test_store(), None).unwrap(),
      "X\t1\nY\t1\nZ\t2\n"
    );
  }

  #[test]
  fn list_filtered_samples() {
    assert_eq!(
      list_samples(&test_store(), Some("population==\"FIN\"")).unwrap(),
      "X\t1\nZ\t2\n"
    );
    assert_eq!(
      list_samples(&test_store(), Some("gender==2 && population!=\"FIN\"")).unwrap(),
      "Y\t1\n"
    );
  }

  #[test]
  fn list_with_invalid_filter() {
    assert!(matches!(
      list_samples(&test_store(), Some("gender==")),
      Err(BgtError::InvalidInput(_))
    ));
  }
}
