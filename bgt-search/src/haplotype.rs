//! Counts haplotypes by the combination of requested alleles they carry.
//!

use std::collections::HashMap;
use std::fmt::Write;

use bgt_config::types::AlleleSpec;
use bgt_storage::{Call, Record, Session};
use bitvec::prelude::*;
use tracing::debug;

use crate::resolver::tested_call;

/// Accumulates one allele pattern per haplotype slot while records are read.
#[derive(Debug)]
pub struct HaplotypeCounter {
  alleles: Vec<AlleleSpec>,
  contig_ids: Vec<Option<usize>>,
  evaluated: BitVec,
  patterns: Vec<BitVec>,
  excluded: BitVec,
}

impl HaplotypeCounter {
  /// Create a counter over resolved alleles.
  pub fn new(alleles: Vec<AlleleSpec>) -> Self {
    let n_alleles = alleles.len();

    Self {
      alleles,
      contig_ids: vec![None; n_alleles],
      evaluated: bitvec![0; n_alleles],
      patterns: Vec::new(),
      excluded: BitVec::new(),
    }
  }

  /// Bind to a prepared session.
  pub fn bind(&mut self, session: &impl Session) {
    self.contig_ids = self
      .alleles
      .iter()
      .map(|allele| session.contig_id(allele.chromosome()))
      .collect();

    let slots = session.slot_count();
    self.patterns = vec![bitvec![0; self.alleles.len()]; slots];
    self.excluded = bitvec![0; slots];
  }

  /// Record the alleles carried by each slot at a record. A slot missing at any evaluated allele is
  /// excluded from the counts.
  pub fn observe(&mut self, record: &Record) {
    for (index, allele) in self.alleles.iter().enumerate() {
      let Some(contig_id) = self.contig_ids[index] else {
        continue;
      };
      if self.evaluated[index] || !record.matches(contig_id, allele) {
        continue;
      }

      self.evaluated.set(index, true);
      let tested = tested_call(allele);

      for (slot, pattern) in self.patterns.iter_mut().enumerate() {
        match record.planes().decode(slot) {
          Call::Missing => self.excluded.set(slot, true),
          call => pattern.set(index, call == tested),
        }
      }
    }
  }

  /// Get the distinct patterns with their haplotype counts, by descending count and then pattern.
  pub fn counts(&self) -> Vec<(String, u64)> {
    let mut counts: HashMap<String, u64> = HashMap::new();

    for (slot, pattern) in self.patterns.iter().enumerate() {
      if self.excluded[slot] {
        continue;
      }

      let pattern: String = pattern
        .iter()
        .map(|bit| if *bit { '1' } else { '0' })
        .collect();
      *counts.entry(pattern).or_default() += 1;
    }

    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|(a_pattern, a_count), (b_pattern, b_count)| {
      b_count.cmp(a_count).then_with(|| a_pattern.cmp(b_pattern))
    });

    counts
  }

  /// Render the allele legend followed by the pattern counts.
  pub fn render(&self) -> String {
    let mut out = String::new();

    for (index, allele) in self.alleles.iter().enumerate() {
      let _ = writeln!(out, "##allele{}={allele}", index + 1);
    }
    out.push_str("#HAP\tCOUNT\n");

    let counts = self.counts();
    debug!(patterns = counts.len(), "counted haplotypes");
    for (pattern, count) in counts {
      let _ = writeln!(out, "{pattern}\t{count}");
    }

    out
  }
}

#[cfg(test)]
mod tests {
  use bgt_config::types::AlleleSelection;
  use bgt_storage::Store;
  use bgt_test::util::test_store;

  use super::*;

  fn count(alleles: Vec<AlleleSpec>) -> HaplotypeCounter {
    let store = test_store();
    let mut session = store.open_session().unwrap();
    session
      .set_alleles(&AlleleSelection::List(alleles.clone()), None)
      .unwrap();
    session.prepare().unwrap();

    let mut counter = HaplotypeCounter::new(alleles);
    counter.bind(&session);
    while let Some(record) = session.read().unwrap() {
      counter.observe(&record);
    }

    counter
  }

  #[test]
  fn patterns_over_two_alleles() {
    let counter = count(vec![
      AlleleSpec::new("11", 100, 1, "C"),
      AlleleSpec::new("11", 250, 1, "A"),
    ]);

    // X is 0|1 then 1|1, Y is 0|0 then 0|1 and Z is 1|1 then 0|0.
    assert_eq!(
      counter.counts(),
      vec![
        ("01".to_string(), 2),
        ("10".to_string(), 2),
        ("00".to_string(), 1),
        ("11".to_string(), 1),
      ]
    );
  }

  #[test]
  fn missing_slots_are_excluded() {
    let counter = count(vec![
      AlleleSpec::new("11", 100, 1, "C"),
      AlleleSpec::new("11", 151344, 1, "G"),
    ]);

    // Z has no call at 151344.
    assert_eq!(
      counter.render(),
      "##allele1=11:100:1:C\n##allele2=11:151344:1:G\n#HAP\tCOUNT\n01\t2\n00\t1\n11\t1\n"
    );
  }
}
