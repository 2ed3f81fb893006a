//! Records, genotype bit planes and sample identities produced by a store session.
//!

use bitvec::prelude::*;
use bgt_config::types::AlleleSpec;

/// A haplotype call decoded from the two genotype bit planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
  Ref = 0,
  Alt = 1,
  Missing = 2,
  Other = 3,
}

impl Call {
  /// Decode a two-bit call, `bit_a | bit_b << 1`.
  pub fn from_bits(bit_a: bool, bit_b: bool) -> Self {
    match (bit_a, bit_b) {
      (false, false) => Call::Ref,
      (true, false) => Call::Alt,
      (false, true) => Call::Missing,
      (true, true) => Call::Other,
    }
  }

  /// The bits of this call in plane order.
  pub fn bits(&self) -> (bool, bool) {
    let value = *self as u8;
    (value & 1 != 0, value & 2 != 0)
  }
}

/// Genotypes of one record as two bit planes over haplotype slots. Sample `i` owns slots `2i`
/// and `2i + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenotypePlanes {
  planes: [BitVec; 2],
}

impl GenotypePlanes {
  /// Create planes where every slot is a reference call.
  pub fn new(slots: usize) -> Self {
    Self {
      planes: [bitvec![0; slots], bitvec![0; slots]],
    }
  }

  /// Create planes from calls, one per slot.
  pub fn from_calls<I: IntoIterator<Item = Call>>(calls: I) -> Self {
    let mut planes = [BitVec::new(), BitVec::new()];
    for call in calls {
      let (a, b) = call.bits();
      planes[0].push(a);
      planes[1].push(b);
    }

    Self { planes }
  }

  /// Set the call of a slot.
  pub fn set(&mut self, slot: usize, call: Call) {
    let (a, b) = call.bits();
    self.planes[0].set(slot, a);
    self.planes[1].set(slot, b);
  }

  /// Get a single bit of a slot from plane 0 or 1.
  pub fn bit(&self, slot: usize, plane: usize) -> bool {
    self.planes[plane][slot]
  }

  /// Decode the call of a slot.
  pub fn decode(&self, slot: usize) -> Call {
    Call::from_bits(self.bit(slot, 0), self.bit(slot, 1))
  }

  /// Whether either slot of a sample decodes to `call`.
  pub fn sample_has(&self, sample: usize, call: Call) -> bool {
    self.decode(sample << 1) == call || self.decode(sample << 1 | 1) == call
  }

  /// Get the number of haplotype slots.
  pub fn slot_count(&self) -> usize {
    self.planes[0].len()
  }

  /// Iterate over the decoded calls of all slots.
  pub fn calls(&self) -> impl Iterator<Item = Call> + '_ {
    (0..self.slot_count()).map(|slot| self.decode(slot))
  }
}

/// Alternate allele counts and called allele numbers, overall and per sample group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlleleCounts {
  count: u32,
  number: u32,
  groups: Vec<(u32, u32)>,
}

impl AlleleCounts {
  /// Count alternate and called alleles over planes. `group_mask` gives the groups of a sample
  /// as a bit mask; group `g` (1-based) is bit `g - 1`.
  pub fn from_planes<F>(planes: &GenotypePlanes, n_groups: usize, group_mask: F) -> Self
  where
    F: Fn(usize) -> u8,
  {
    let mut counts = Self {
      count: 0,
      number: 0,
      groups: vec![(0, 0); n_groups],
    };

    for slot in 0..planes.slot_count() {
      let (alt, called) = match planes.decode(slot) {
        Call::Alt => (1, 1),
        Call::Ref | Call::Other => (0, 1),
        Call::Missing => (0, 0),
      };

      counts.count += alt;
      counts.number += called;

      let mask = group_mask(slot >> 1);
      for (group, (count, number)) in counts.groups.iter_mut().enumerate() {
        if mask & (1 << group) != 0 {
          *count += alt;
          *number += called;
        }
      }
    }

    counts
  }

  /// Get the alternate allele count.
  pub fn count(&self) -> u32 {
    self.count
  }

  /// Get the called allele number.
  pub fn number(&self) -> u32 {
    self.number
  }

  /// Get the count and number of a 1-based group.
  pub fn group(&self, group: usize) -> Option<(u32, u32)> {
    group.checked_sub(1).and_then(|index| self.groups.get(index)).copied()
  }

  /// Get the number of groups.
  pub fn group_count(&self) -> usize {
    self.groups.len()
  }
}

/// A biallelic variant record with the genotypes of the session's output samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
  contig_id: usize,
  contig: String,
  position: u64,
  reference_length: u64,
  reference: String,
  alt: String,
  counts: AlleleCounts,
  planes: GenotypePlanes,
}

impl Record {
  /// Create a new record. The position is 1-based.
  pub fn new(
    contig_id: usize,
    contig: impl Into<String>,
    position: u64,
    reference_length: u64,
    reference: impl Into<String>,
    alt: impl Into<String>,
    planes: GenotypePlanes,
  ) -> Self {
    Self {
      contig_id,
      contig: contig.into(),
      position,
      reference_length,
      reference: reference.into(),
      alt: alt.into(),
      counts: AlleleCounts::default(),
      planes,
    }
  }

  /// Set the allele counts.
  pub fn with_counts(mut self, counts: AlleleCounts) -> Self {
    self.counts = counts;
    self
  }

  /// Get the contig id within the session header.
  pub fn contig_id(&self) -> usize {
    self.contig_id
  }

  /// Get the contig name.
  pub fn contig(&self) -> &str {
    &self.contig
  }

  /// Get the 1-based position.
  pub fn position(&self) -> u64 {
    self.position
  }

  /// Get the reference length.
  pub fn reference_length(&self) -> u64 {
    self.reference_length
  }

  /// Get the 1-based inclusive end.
  pub fn end(&self) -> u64 {
    self.position + self.reference_length.max(1) - 1
  }

  /// Get the reference allele.
  pub fn reference(&self) -> &str {
    &self.reference
  }

  /// Get the alternate allele.
  pub fn alt(&self) -> &str {
    &self.alt
  }

  /// Get the allele counts.
  pub fn counts(&self) -> &AlleleCounts {
    &self.counts
  }

  /// Get the genotype planes.
  pub fn planes(&self) -> &GenotypePlanes {
    &self.planes
  }

  /// Whether any slot carries an allele other than the reference and this record's alternate.
  pub fn has_other(&self) -> bool {
    self.planes.calls().any(|call| call == Call::Other)
  }

  /// Whether this record is the site named by an allele spec. A reference-state spec matches any
  /// alternate at the site.
  pub fn matches(&self, contig_id: usize, spec: &AlleleSpec) -> bool {
    self.contig_id == contig_id
      && self.position == spec.position()
      && self.reference_length == spec.reference_length()
      && (spec.is_reference() || self.alt == spec.allele())
  }
}

/// Identifies a sample by the file it belongs to and its row within that file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleRef {
  file: usize,
  row: usize,
}

impl SampleRef {
  /// Create a new sample ref.
  pub fn new(file: usize, row: usize) -> Self {
    Self { file, row }
  }

  /// Get the 0-based file index.
  pub fn file(&self) -> usize {
    self.file
  }

  /// Get the row within the file.
  pub fn row(&self) -> usize {
    self.row
  }
}

/// The outcome of resolving an allele selection against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlleleResolution {
  /// The alleles present in the store, in request order.
  Resolved(Vec<AlleleSpec>),
  /// The selection was valid but no allele is present.
  NoMatches,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn call_bits() {
    for call in [Call::Ref, Call::Alt, Call::Missing, Call::Other] {
      let (a, b) = call.bits();
      assert_eq!(Call::from_bits(a, b), call);
    }
    assert_eq!(Call::Alt.bits(), (true, false));
    assert_eq!(Call::Missing.bits(), (false, true));
  }

  #[test]
  fn planes_decode_per_slot() {
    let mut planes = GenotypePlanes::new(4);
    planes.set(1, Call::Alt);
    planes.set(2, Call::Missing);
    planes.set(3, Call::Other);

    assert_eq!(planes.decode(0), Call::Ref);
    assert_eq!(planes.decode(1), Call::Alt);
    assert!(planes.bit(1, 0));
    assert!(!planes.bit(1, 1));
    assert_eq!(planes.decode(2), Call::Missing);
    assert_eq!(planes.decode(3), Call::Other);
    assert!(planes.sample_has(0, Call::Ref));
    assert!(planes.sample_has(0, Call::Alt));
    assert!(!planes.sample_has(1, Call::Alt));
  }

  #[test]
  fn counts_overall_and_grouped() {
    let planes = GenotypePlanes::from_calls([
      Call::Ref,
      Call::Alt,
      Call::Alt,
      Call::Alt,
      Call::Missing,
      Call::Ref,
    ]);
    let counts = AlleleCounts::from_planes(&planes, 2, |sample| match sample {
      0 => 0b01,
      1 => 0b11,
      _ => 0b10,
    });

    assert_eq!(counts.count(), 3);
    assert_eq!(counts.number(), 5);
    assert_eq!(counts.group(1), Some((3, 4)));
    assert_eq!(counts.group(2), Some((2, 3)));
    assert_eq!(counts.group(3), None);
    assert_eq!(counts.group(0), None);
  }

  #[test]
  fn record_matches_spec() {
    let record = Record::new(0, "11", 151344, 1, "A", "G", GenotypePlanes::new(2));

    assert!(record.matches(0, &AlleleSpec::new("11", 151344, 1, "G")));
    assert!(record.matches(0, &AlleleSpec::new("11", 151344, 1, "")));
    assert!(!record.matches(0, &AlleleSpec::new("11", 151344, 1, "T")));
    assert!(!record.matches(1, &AlleleSpec::new("11", 151344, 1, "G")));
    assert!(!record.matches(0, &AlleleSpec::new("11", 151344, 2, "G")));
    assert_eq!(record.end(), 151344);
  }
}
