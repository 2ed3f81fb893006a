//! Module providing the abstractions needed to read genotypes from a BGT collection.
//!
//! A [`Store`] owns the read-only files of a collection and hands out [`Session`]s. A session is
//! configured, prepared and then read record by record; dropping it releases everything it holds.
//!

pub use error::{Result, StoreError};
pub use types::{AlleleCounts, AlleleResolution, Call, GenotypePlanes, Record, SampleRef};

use bgt_config::types::{AlleleSelection, OutputFlags, Region, SampleGroup, TableColumn};

use crate::fmf::AnnotationDb;

pub mod error;
pub mod expr;
pub mod fmf;
pub mod memory;
pub mod types;

/// A multi-file variant store.
pub trait Store: Send + Sync + 'static {
  type Session: Session;

  /// Open a new session over every file of the collection.
  fn open_session(&self) -> Result<Self::Session>;

  /// Get the number of files.
  fn file_count(&self) -> usize;

  /// Get the name a file is reported under.
  fn file_name(&self, file: usize) -> Option<&str>;

  /// Get the sample annotations of a file, one row per sample in file order.
  fn sample_annotations(&self, file: usize) -> Option<&AnnotationDb>;

  /// Get the variant annotation database, if one is loaded.
  fn variant_annotations(&self) -> Option<&AnnotationDb>;

  /// Get the name of a sample.
  fn sample_name(&self, sample: SampleRef) -> Option<&str> {
    self
      .sample_annotations(sample.file())?
      .row(sample.row())
      .map(|row| row.name())
  }
}

/// A query session over a store. Setters may be called in any order before [`Session::prepare`].
pub trait Session: Send {
  /// Set the output flags.
  fn set_flags(&mut self, flags: OutputFlags);

  /// Set a filter over allele counts. Fails if the expression cannot be parsed.
  fn set_site_filter(&mut self, filter: &str) -> Result<()>;

  /// Restrict reading to a region. Fails for an unknown chromosome.
  fn set_region(&mut self, region: &Region) -> Result<()>;

  /// Skip records before the 1-based record `start`.
  fn set_start(&mut self, start: u64) -> Result<()>;

  /// Stop reading once `limit` genotypes were decoded. Records rejected by the site filter or
  /// skipped before the start record count too.
  fn set_genotype_limit(&mut self, limit: u64);

  /// Set the columns used by [`Session::format_table`].
  fn set_table(&mut self, columns: &[TableColumn]) -> Result<()>;

  /// Restrict reading to the selected alleles.
  fn set_alleles(
    &mut self,
    alleles: &AlleleSelection,
    annotations: Option<&AnnotationDb>,
  ) -> Result<AlleleResolution>;

  /// Add a sample group, returning its 1-based number.
  fn add_group(&mut self, group: &SampleGroup) -> Result<usize>;

  /// Finish configuration. Must be called before reading.
  fn prepare(&mut self) -> Result<()>;

  /// Get the number of samples in each group.
  fn group_sizes(&self) -> Vec<usize>;

  /// Get the VCF header of the session's output. Every line, including the last, ends in `\n`.
  fn header(&self) -> String;

  /// Look up a chromosome in the session header.
  fn contig_id(&self, name: &str) -> Option<usize>;

  /// Get the number of haplotype slots of each record, two per output sample.
  fn slot_count(&self) -> usize;

  /// Get the identity of an output sample.
  fn output_sample(&self, sample: usize) -> Option<SampleRef>;

  /// Read the next record.
  fn read(&mut self) -> Result<Option<Record>>;

  /// Whether reading stopped at the genotype limit with matching sites left.
  fn genotype_limit_reached(&self) -> bool;

  /// Format a record as a VCF line, without the line terminator.
  fn format_vcf(&self, record: &Record) -> String;

  /// Format a record as a table line, if table columns were set.
  fn format_table(&self, record: &Record) -> Option<String>;
}
