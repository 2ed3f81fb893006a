//! Finds the samples carrying every requested allele.
//!
//! Each allele is tested at the first record that defines it. A sample's counter is incremented
//! when either of its haplotypes carries the tested state, the reference for an allele without a
//! sequence and the alternate otherwise, and a sample is reported once its counter equals the
//! number of requested alleles.
//!

use std::fmt::Write;

use bgt_config::types::{AlleleSpec, BgtError, Region, Result};
use bgt_storage::expr::Expr;
use bgt_storage::{Call, Record, SampleRef, Session, Store};
use tracing::{debug, trace};

/// The smallest region covering every allele. Alleles on different chromosomes are rejected.
pub fn spanning_region(alleles: &[AlleleSpec]) -> Result<Region> {
  let first = alleles
    .first()
    .ok_or_else(|| BgtError::invalid_input("no alleles to resolve"))?;

  if let Some(other) = alleles
    .iter()
    .find(|allele| allele.chromosome() != first.chromosome())
  {
    return Err(BgtError::invalid_input(format!(
      "alleles `{first}` and `{other}` are on different chromosomes"
    )));
  }

  let positions = alleles.iter().map(AlleleSpec::position);
  let start = positions.clone().min().unwrap_or(first.position());
  let end = positions.max().unwrap_or(first.position());

  Ok(Region::new(first.chromosome(), Some(start), Some(end)))
}

/// The call an allele is tested for.
pub(crate) fn tested_call(allele: &AlleleSpec) -> Call {
  if allele.is_reference() {
    Call::Ref
  } else {
    Call::Alt
  }
}

#[derive(Debug)]
struct TestedAllele {
  spec: AlleleSpec,
  contig_id: Option<usize>,
  evaluated: bool,
}

/// Matches samples against a list of alleles while records are read.
#[derive(Debug)]
pub struct SampleResolver {
  alleles: Vec<TestedAllele>,
  region: Region,
  required: usize,
  counters: Vec<usize>,
  filter: Option<Expr>,
}

impl SampleResolver {
  /// Create a resolver for alleles resolved in the store. `required` is the number of alleles a
  /// sample must carry, which is larger than the number of alleles when some were not found.
  pub fn new(alleles: Vec<AlleleSpec>, required: usize) -> Result<Self> {
    let region = spanning_region(&alleles)?;

    Ok(Self {
      alleles: alleles
        .into_iter()
        .map(|spec| TestedAllele {
          spec,
          contig_id: None,
          evaluated: false,
        })
        .collect(),
      region,
      required: required.max(1),
      counters: Vec::new(),
      filter: None,
    })
  }

  /// Report only the matching samples whose annotations pass `filter`.
  pub fn with_filter(mut self, filter: Expr) -> Self {
    self.filter = Some(filter);
    self
  }

  /// Get the region covering every allele.
  pub fn region(&self) -> &Region {
    &self.region
  }

  /// Bind to a prepared session: resolve chromosomes and size the counters.
  pub fn bind(&mut self, session: &impl Session) {
    for allele in &mut self.alleles {
      allele.contig_id = session.contig_id(allele.spec.chromosome());
    }

    self.counters = vec![0; session.slot_count() >> 1];
  }

  /// Count the samples carrying the alleles defined by a record.
  pub fn observe(&mut self, record: &Record) {
    for allele in &mut self.alleles {
      let Some(contig_id) = allele.contig_id else {
        continue;
      };
      if allele.evaluated || !record.matches(contig_id, &allele.spec) {
        continue;
      }

      allele.evaluated = true;
      let call = tested_call(&allele.spec);
      trace!(allele = %allele.spec, ?call, "testing allele");

      for (sample, counter) in self.counters.iter_mut().enumerate() {
        if record.planes().sample_has(sample, call) {
          *counter += 1;
        }
      }
    }
  }

  /// Get the output sample indices carrying every allele.
  pub fn matching(&self) -> impl Iterator<Item = usize> + '_ {
    self
      .counters
      .iter()
      .enumerate()
      .filter(|(_, counter)| **counter == self.required)
      .map(|(sample, _)| sample)
  }

  fn passes_filter(&self, sample: SampleRef, store: &impl Store) -> bool {
    self.filter.as_ref().is_none_or(|filter| {
      store
        .sample_annotations(sample.file())
        .is_some_and(|samples| samples.test(sample.row(), filter))
    })
  }

  /// Render the matching samples as `name<TAB>file` lines, with 1-based file numbers.
  pub fn render(&self, session: &impl Session, store: &impl Store) -> String {
    let mut out = String::new();
    let mut matched = 0;

    for sample in self
      .matching()
      .filter_map(|sample| session.output_sample(sample))
      .filter(|sample| self.passes_filter(*sample, store))
    {
      if let Some(name) = store.sample_name(sample) {
        let _ = writeln!(out, "{name}\t{}", sample.file() + 1);
        matched += 1;
      }
    }

    debug!(matched, "resolved samples");
    out
  }
}

#[cfg(test)]
mod tests {
  use bgt_config::types::AlleleSelection;
  use bgt_storage::AlleleResolution;
  use bgt_test::util::test_store;

  use super::*;

  fn resolve(alleles: &str) -> String {
    resolve_filtered(alleles, None)
  }

  fn resolve_filtered(alleles: &str, filter: Option<&str>) -> String {
    let store = test_store();
    let mut session = store.open_session().unwrap();

    let selection = AlleleSelection::parse(alleles).unwrap();
    let AlleleResolution::Resolved(resolved) = session.set_alleles(&selection, None).unwrap() else {
      return String::new();
    };
    let AlleleSelection::List(requested) = selection else {
      unreachable!()
    };

    let mut resolver = SampleResolver::new(resolved, requested.len()).unwrap();
    if let Some(filter) = filter {
      resolver = resolver.with_filter(filter.parse().unwrap());
    }
    session.set_region(resolver.region()).unwrap();
    session.prepare().unwrap();
    resolver.bind(&session);

    while let Some(record) = session.read().unwrap() {
      resolver.observe(&record);
    }

    resolver.render(&session, &store)
  }

  #[test]
  fn spanning_region_covers_positions() {
    let alleles = vec![
      AlleleSpec::new("11", 250, 1, "A"),
      AlleleSpec::new("11", 100, 1, "C"),
    ];

    assert_eq!(
      spanning_region(&alleles).unwrap(),
      Region::new("11", Some(100), Some(250))
    );
  }

  #[test]
  fn spanning_region_single_chromosome() {
    let alleles = vec![
      AlleleSpec::new("11", 250, 1, "A"),
      AlleleSpec::new("20", 100, 1, "C"),
    ];

    assert!(matches!(
      spanning_region(&alleles),
      Err(BgtError::InvalidInput(_))
    ));
    assert!(matches!(
      SampleResolver::new(alleles, 2),
      Err(BgtError::InvalidInput(_))
    ));
  }

  #[test]
  fn samples_carrying_all_alleles() {
    assert_eq!(resolve(",11:151344:1:G,11:160513::G"), "X\t1\n");
  }

  #[test]
  fn samples_carrying_one_allele() {
    assert_eq!(resolve(",11:151344:1:G"), "X\t1\nY\t1\n");
  }

  #[test]
  fn samples_across_files() {
    assert_eq!(resolve(",11:100:1:C"), "X\t1\nZ\t2\n");
    assert_eq!(resolve(",11:100:1:C,11:250:1:A"), "X\t1\n");
  }

  #[test]
  fn reference_state() {
    assert_eq!(resolve(",11:250::T"), "Y\t1\nZ\t2\n");
  }

  #[test]
  fn filter_restricts_reported_samples() {
    assert_eq!(
      resolve_filtered(",11:100:1:C", Some("gender==2")),
      "Z\t2\n"
    );
    assert_eq!(
      resolve_filtered(",11:100:1:C", Some("population==\"CEU\"")),
      ""
    );
  }

  #[test]
  fn missing_allele_matches_nothing() {
    assert_eq!(resolve(",11:151344:1:G,11:151345:1:G"), "");
  }
}
