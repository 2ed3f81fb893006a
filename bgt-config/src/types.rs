//! Types shared by the query path: requests, regions, alleles, sample groups and structured queries.
//!

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::{fmt, io, result};

use thiserror::Error;

/// The result type returning a `BgtError`.
pub type Result<T> = result::Result<T, BgtError>;

/// The maximum number of sample groups a query may define.
pub const MAX_GROUPS: usize = 8;

/// An ordered, multi-valued parameter map. Keys may repeat and the order in which values were
/// supplied is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
  /// Create new params from key-value pairs.
  pub fn new(pairs: Vec<(String, String)>) -> Self {
    Self(pairs)
  }

  /// Get the first value of a key.
  pub fn get(&self, key: &str) -> Option<&str> {
    self
      .0
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }

  /// Get every value of a key, in the order they were supplied.
  pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    self
      .0
      .iter()
      .filter(move |(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }

  /// Whether the key was supplied at all, with or without a value.
  pub fn contains(&self, key: &str) -> bool {
    self.0.iter().any(|(k, _)| k == key)
  }

  /// Whether no parameters were supplied.
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Iterate over all pairs.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
  fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
    Self(
      iter
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect(),
    )
  }
}

/// A request as seen by the query layer, independent of the web framework.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
  params: Params,
  host: Option<String>,
}

impl Request {
  /// Create a new request.
  pub fn new(params: Params, host: Option<String>) -> Self {
    Self { params, host }
  }

  /// Get the params.
  pub fn params(&self) -> &Params {
    &self.params
  }

  /// Get the host the request was addressed to.
  pub fn host(&self) -> Option<&str> {
    self.host.as_deref()
  }
}

/// A genomic region, using 1-based closed coordinates. Missing bounds are open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
  chromosome: String,
  start: Option<u64>,
  end: Option<u64>,
}

impl Region {
  /// Create a new region.
  pub fn new(chromosome: impl Into<String>, start: Option<u64>, end: Option<u64>) -> Self {
    Self {
      chromosome: chromosome.into(),
      start,
      end,
    }
  }

  /// Get the chromosome.
  pub fn chromosome(&self) -> &str {
    &self.chromosome
  }

  /// Get the 1-based start.
  pub fn start(&self) -> Option<u64> {
    self.start
  }

  /// Get the 1-based inclusive end.
  pub fn end(&self) -> Option<u64> {
    self.end
  }

  /// Whether the 1-based closed interval `[start, end]` overlaps this region.
  pub fn overlaps(&self, start: u64, end: u64) -> bool {
    self.start.is_none_or(|region_start| end >= region_start)
      && self.end.is_none_or(|region_end| start <= region_end)
  }

  fn parse_position(value: &str, region: &str) -> Result<u64> {
    value
      .replace(',', "")
      .parse::<u64>()
      .map_err(|err| BgtError::invalid_input(format!("invalid position in region `{region}`: {err}")))
  }
}

impl FromStr for Region {
  type Err = BgtError;

  fn from_str(s: &str) -> Result<Self> {
    let s = s.trim();
    let (chromosome, interval) = match s.rsplit_once(':') {
      Some((chromosome, interval)) => (chromosome, Some(interval)),
      None => (s, None),
    };

    if chromosome.is_empty() {
      return Err(BgtError::invalid_input(format!(
        "missing chromosome in region `{s}`"
      )));
    }

    let (start, end) = match interval {
      None | Some("") => (None, None),
      Some(interval) => match interval.split_once('-') {
        Some((start, "")) => (Some(Self::parse_position(start, s)?), None),
        Some((start, end)) => (
          Some(Self::parse_position(start, s)?),
          Some(Self::parse_position(end, s)?),
        ),
        None => (Some(Self::parse_position(interval, s)?), None),
      },
    };

    if start == Some(0) {
      return Err(BgtError::invalid_input(format!(
        "region `{s}` must start at 1 or later"
      )));
    }
    if let (Some(start), Some(end)) = (start, end) {
      if end < start {
        return Err(BgtError::invalid_input(format!(
          "region `{s}` ends before it starts"
        )));
      }
    }

    Ok(Self::new(chromosome, start, end))
  }
}

impl Display for Region {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match (self.start, self.end) {
      (None, None) => write!(f, "{}", self.chromosome),
      (Some(start), None) => write!(f, "{}:{start}", self.chromosome),
      (None, Some(end)) => write!(f, "{}:1-{end}", self.chromosome),
      (Some(start), Some(end)) => write!(f, "{}:{start}-{end}", self.chromosome),
    }
  }
}

/// A requested allele: `chr:pos:ref:allele`. The `ref` field is either a reference length or the
/// reference sequence. An empty allele asks for the reference state at the site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlleleSpec {
  chromosome: String,
  position: u64,
  reference_length: u64,
  allele: String,
}

impl AlleleSpec {
  /// Create a new allele spec. The position is 1-based.
  pub fn new(
    chromosome: impl Into<String>,
    position: u64,
    reference_length: u64,
    allele: impl Into<String>,
  ) -> Self {
    Self {
      chromosome: chromosome.into(),
      position,
      reference_length,
      allele: allele.into(),
    }
  }

  /// Get the chromosome.
  pub fn chromosome(&self) -> &str {
    &self.chromosome
  }

  /// Get the 1-based position.
  pub fn position(&self) -> u64 {
    self.position
  }

  /// Get the reference length.
  pub fn reference_length(&self) -> u64 {
    self.reference_length
  }

  /// Get the allele sequence, empty for a reference-state request.
  pub fn allele(&self) -> &str {
    &self.allele
  }

  /// Whether this asks for the reference state.
  pub fn is_reference(&self) -> bool {
    self.allele.is_empty()
  }
}

impl FromStr for AlleleSpec {
  type Err = BgtError;

  fn from_str(s: &str) -> Result<Self> {
    let invalid = || BgtError::invalid_input(format!("malformed allele `{s}`"));

    let mut fields = s.trim().rsplitn(4, ':');
    let allele = fields.next().ok_or_else(invalid)?;
    let reference = fields.next().ok_or_else(invalid)?;
    let position = fields.next().ok_or_else(invalid)?;
    let chromosome = fields.next().ok_or_else(invalid)?;

    if chromosome.is_empty() {
      return Err(invalid());
    }

    let position = position.parse::<u64>().map_err(|_| invalid())?;
    if position == 0 {
      return Err(invalid());
    }

    // `chr:pos::REF` names the reference state, with the reference sequence in the last field.
    let (reference_length, allele) = if reference.is_empty() {
      (allele.len() as u64, "")
    } else if reference.bytes().all(|b| b.is_ascii_digit()) {
      (reference.parse::<u64>().map_err(|_| invalid())?, allele)
    } else {
      (reference.len() as u64, allele)
    };

    if reference_length == 0 || allele.contains(char::is_whitespace) {
      return Err(invalid());
    }

    Ok(Self::new(chromosome, position, reference_length, allele))
  }
}

impl Display for AlleleSpec {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}:{}:{}:{}",
      self.chromosome, self.position, self.reference_length, self.allele
    )
  }
}

/// A column of tabular output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableColumn {
  Chrom,
  Pos,
  End,
  Ref,
  Alt,
  AlleleCount,
  AlleleNumber,
  /// Allele count within a 1-based sample group.
  GroupAlleleCount(usize),
  /// Called alleles within a 1-based sample group.
  GroupAlleleNumber(usize),
}

impl TableColumn {
  /// Parse a comma-separated column list.
  pub fn parse_list(columns: &str) -> Result<Vec<Self>> {
    columns
      .split(',')
      .map(str::trim)
      .filter(|column| !column.is_empty())
      .map(str::parse)
      .collect()
  }

  /// The group this column refers to, if any.
  pub fn group(&self) -> Option<usize> {
    match self {
      Self::GroupAlleleCount(group) | Self::GroupAlleleNumber(group) => Some(*group),
      _ => None,
    }
  }
}

impl FromStr for TableColumn {
  type Err = BgtError;

  fn from_str(s: &str) -> Result<Self> {
    let upper = s.to_ascii_uppercase();
    let column = match upper.as_str() {
      "CHROM" => Self::Chrom,
      "POS" => Self::Pos,
      "END" => Self::End,
      "REF" => Self::Ref,
      "ALT" => Self::Alt,
      "AC" => Self::AlleleCount,
      "AN" => Self::AlleleNumber,
      other => {
        let group = |prefix: &str| {
          other
            .strip_prefix(prefix)
            .and_then(|group| group.parse::<usize>().ok())
            .filter(|group| (1..=MAX_GROUPS).contains(group))
        };

        if let Some(group) = group("AC") {
          Self::GroupAlleleCount(group)
        } else if let Some(group) = group("AN") {
          Self::GroupAlleleNumber(group)
        } else {
          return Err(BgtError::invalid_input(format!(
            "unrecognized table column `{s}`"
          )));
        }
      }
    };

    Ok(column)
  }
}

impl Display for TableColumn {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      Self::Chrom => write!(f, "CHROM"),
      Self::Pos => write!(f, "POS"),
      Self::End => write!(f, "END"),
      Self::Ref => write!(f, "REF"),
      Self::Alt => write!(f, "ALT"),
      Self::AlleleCount => write!(f, "AC"),
      Self::AlleleNumber => write!(f, "AN"),
      Self::GroupAlleleCount(group) => write!(f, "AC{group}"),
      Self::GroupAlleleNumber(group) => write!(f, "AN{group}"),
    }
  }
}

/// The alleles a query asks about: a literal list, or an expression over variant annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlleleSelection {
  List(Vec<AlleleSpec>),
  Expression(String),
}

impl AlleleSelection {
  /// Parse a selection. A leading comma introduces a literal list.
  pub fn parse(value: &str) -> Result<Self> {
    match value.strip_prefix(',') {
      Some(list) => Ok(Self::List(
        list
          .split(',')
          .filter(|allele| !allele.is_empty())
          .map(str::parse)
          .collect::<Result<Vec<_>>>()?,
      )),
      None if value.trim().is_empty() => Err(BgtError::invalid_input("empty allele expression")),
      None => Ok(Self::Expression(value.to_string())),
    }
  }
}

/// A sample group: a literal list of sample names or an expression over sample annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleGroup {
  List(Vec<String>),
  Expression(String),
}

impl SampleGroup {
  /// Parse a group. A leading comma introduces a literal list.
  pub fn parse(value: &str) -> Result<Self> {
    match value.strip_prefix(',') {
      Some(list) => Ok(Self::List(
        list
          .split(',')
          .filter(|name| !name.is_empty())
          .map(str::to_string)
          .collect(),
      )),
      None if value.trim().is_empty() => Err(BgtError::invalid_input("empty sample group")),
      None => Ok(Self::Expression(value.to_string())),
    }
  }
}

/// Output mode flags of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFlags {
  genotypes: bool,
  allele_counts: bool,
  haplotype_counts: bool,
  sample_list: bool,
}

impl OutputFlags {
  /// Set whether genotypes are emitted.
  pub fn with_genotypes(mut self, genotypes: bool) -> Self {
    self.genotypes = genotypes;
    self
  }

  /// Set whether allele counts are computed and emitted.
  pub fn with_allele_counts(mut self, allele_counts: bool) -> Self {
    self.allele_counts = allele_counts;
    self
  }

  /// Set whether haplotype counts are emitted.
  pub fn with_haplotype_counts(mut self, haplotype_counts: bool) -> Self {
    self.haplotype_counts = haplotype_counts;
    self
  }

  /// Set whether matching samples are listed.
  pub fn with_sample_list(mut self, sample_list: bool) -> Self {
    self.sample_list = sample_list;
    self
  }

  /// Get genotype emission.
  pub fn genotypes(&self) -> bool {
    self.genotypes
  }

  /// Get allele count emission.
  pub fn allele_counts(&self) -> bool {
    self.allele_counts
  }

  /// Get haplotype count emission.
  pub fn haplotype_counts(&self) -> bool {
    self.haplotype_counts
  }

  /// Get sample listing.
  pub fn sample_list(&self) -> bool {
    self.sample_list
  }
}

impl Default for OutputFlags {
  fn default() -> Self {
    Self {
      genotypes: true,
      allele_counts: false,
      haplotype_counts: false,
      sample_list: false,
    }
  }
}

/// A structured query, translated from the request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
  flags: OutputFlags,
  site_filter: Option<String>,
  region: Option<Region>,
  start: Option<u64>,
  max_records: Option<u64>,
  table: Option<Vec<TableColumn>>,
  alleles: Option<AlleleSelection>,
  groups: Vec<SampleGroup>,
  sample_filter: Option<String>,
}

impl Query {
  /// Set the output flags.
  pub fn with_flags(mut self, flags: OutputFlags) -> Self {
    self.flags = flags;
    self
  }

  /// Set the site filter.
  pub fn with_site_filter(mut self, site_filter: impl Into<String>) -> Self {
    self.site_filter = Some(site_filter.into());
    self
  }

  /// Set the region.
  pub fn with_region(mut self, region: Region) -> Self {
    self.region = Some(region);
    self
  }

  /// Set the 1-based record to start from.
  pub fn with_start(mut self, start: u64) -> Self {
    self.start = Some(start);
    self
  }

  /// Set the maximum number of records.
  pub fn with_max_records(mut self, max_records: u64) -> Self {
    self.max_records = Some(max_records);
    self
  }

  /// Set the table columns.
  pub fn with_table(mut self, table: Vec<TableColumn>) -> Self {
    self.table = Some(table);
    self
  }

  /// Set the allele selection.
  pub fn with_alleles(mut self, alleles: AlleleSelection) -> Self {
    self.alleles = Some(alleles);
    self
  }

  /// Append a sample group.
  pub fn with_group(mut self, group: SampleGroup) -> Self {
    self.groups.push(group);
    self
  }

  /// Set the sample listing filter.
  pub fn with_sample_filter(mut self, sample_filter: impl Into<String>) -> Self {
    self.sample_filter = Some(sample_filter.into());
    self
  }

  /// Get the flags.
  pub fn flags(&self) -> OutputFlags {
    self.flags
  }

  /// Get the site filter.
  pub fn site_filter(&self) -> Option<&str> {
    self.site_filter.as_deref()
  }

  /// Get the region.
  pub fn region(&self) -> Option<&Region> {
    self.region.as_ref()
  }

  /// Get the start record.
  pub fn start(&self) -> Option<u64> {
    self.start
  }

  /// Get the maximum number of records.
  pub fn max_records(&self) -> Option<u64> {
    self.max_records
  }

  /// Get the table columns.
  pub fn table(&self) -> Option<&[TableColumn]> {
    self.table.as_deref()
  }

  /// Get the allele selection.
  pub fn alleles(&self) -> Option<&AlleleSelection> {
    self.alleles.as_ref()
  }

  /// Get the sample groups in numbering order.
  pub fn groups(&self) -> &[SampleGroup] {
    &self.groups
  }

  /// Get the sample listing filter.
  pub fn sample_filter(&self) -> Option<&str> {
    self.sample_filter.as_deref()
  }

  /// VCF is emitted unless a table, haplotype counts or a sample list was requested.
  pub fn is_vcf_output(&self) -> bool {
    self.table.is_none() && !self.flags.haplotype_counts && !self.flags.sample_list
  }

  /// A sample listing without alleles needs no genotype scan.
  pub fn is_sample_listing(&self) -> bool {
    self.alleles.is_none() && (self.flags.sample_list || self.sample_filter.is_some())
  }
}

/// Possible errors of the query path.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BgtError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("permission denied: {0}")]
  PermissionDenied(String),

  #[error("io error: {0}")]
  IoError(String),

  #[error("parsing error: {0}")]
  ParseError(String),

  #[error("internal error: {0}")]
  InternalError(String),
}

impl BgtError {
  /// Create a `NotFound` error.
  pub fn not_found<S: Into<String>>(message: S) -> Self {
    Self::NotFound(message.into())
  }

  /// Create an `InvalidInput` error.
  pub fn invalid_input<S: Into<String>>(message: S) -> Self {
    Self::InvalidInput(message.into())
  }

  /// Create a `PermissionDenied` error.
  pub fn permission_denied<S: Into<String>>(message: S) -> Self {
    Self::PermissionDenied(message.into())
  }

  /// Create an `IoError` error.
  pub fn io_error<S: Into<String>>(message: S) -> Self {
    Self::IoError(message.into())
  }

  /// Create a `ParseError` error.
  pub fn parse_error<S: Into<String>>(message: S) -> Self {
    Self::ParseError(message.into())
  }

  /// Create an `InternalError` error.
  pub fn internal_error<S: Into<String>>(message: S) -> Self {
    Self::InternalError(message.into())
  }
}

impl From<BgtError> for io::Error {
  fn from(error: BgtError) -> Self {
    Self::other(error)
  }
}

impl From<io::Error> for BgtError {
  fn from(err: io::Error) -> Self {
    Self::io_error(err.to_string())
  }
}
