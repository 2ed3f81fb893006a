use bgt_config::config::limits::Limits;
use bgt_config::types::{
  AlleleSelection, MAX_GROUPS, OutputFlags, Params, Query, Region, SampleGroup, TableColumn,
};

use crate::error::{HttpError, Result};
use crate::escape::unescape;

fn invalid_parameter(parameter: &str, reason: impl std::fmt::Display) -> HttpError {
  HttpError::InvalidInput(format!(
    "failed to parse parameter '{parameter}': {reason}"
  ))
}

/// Builds a query from request parameters, one parameter at a time.
#[derive(Debug)]
pub struct QueryBuilder {
  query: Query,
  limits: Limits,
}

impl QueryBuilder {
  pub fn new(limits: Limits) -> Self {
    Self {
      query: Query::default(),
      limits,
    }
  }

  pub fn build(self) -> Query {
    self.query
  }

  /// Set the output flags. These are decided before any other parameter is read: genotypes are
  /// emitted unless `G` is given without `g`, and allele counts are computed for `C` or whenever
  /// a sample group is defined.
  pub fn with_flags(mut self, params: &Params) -> Self {
    let flags = OutputFlags::default()
      .with_genotypes(!params.contains("G") || params.contains("g"))
      .with_allele_counts(params.contains("C") || params.contains("s"))
      .with_haplotype_counts(params.contains("H"))
      .with_sample_list(params.contains("S"));

    self.query = self.query.with_flags(flags);
    self
  }

  pub fn with_site_filter(mut self, filter: Option<&str>) -> Self {
    if let Some(filter) = filter.filter(|filter| !filter.trim().is_empty()) {
      self.query = self.query.with_site_filter(unescape(filter));
    }
    self
  }

  pub fn with_region(mut self, region: Option<&str>) -> Result<Self> {
    if let Some(region) = region.filter(|region| !region.trim().is_empty()) {
      self.query = self.query.with_region(
        region
          .parse::<Region>()
          .map_err(|err| invalid_parameter("r", err))?,
      );
    }
    Ok(self)
  }

  pub fn with_start(mut self, start: Option<&str>) -> Result<Self> {
    if let Some(start) = start {
      let start = start
        .trim()
        .parse::<u64>()
        .map_err(|err| invalid_parameter("i", err))?;
      if start == 0 {
        return Err(invalid_parameter("i", "records are numbered from 1"));
      }

      self.query = self.query.with_start(start);
    }
    Ok(self)
  }

  /// Set the record limit, clamped to the genotype ceiling. A negative limit reads nothing.
  pub fn with_max_records(mut self, max_records: Option<&str>) -> Result<Self> {
    if let Some(max_records) = max_records {
      let max_records = max_records
        .trim()
        .parse::<i64>()
        .map_err(|err| invalid_parameter("n", err))?;

      self.query = self.query.with_max_records(
        u64::try_from(max_records)
          .unwrap_or(0)
          .min(self.limits.max_genotypes()),
      );
    }
    Ok(self)
  }

  pub fn with_table(mut self, table: Option<&str>) -> Result<Self> {
    if let Some(table) = table {
      let columns = TableColumn::parse_list(table).map_err(|err| invalid_parameter("t", err))?;
      if columns.is_empty() {
        return Err(invalid_parameter("t", "no columns"));
      }

      self.query = self.query.with_table(columns);
    }
    Ok(self)
  }

  pub fn with_alleles(mut self, alleles: Option<&str>) -> Result<Self> {
    if let Some(alleles) = alleles {
      self.query = self.query.with_alleles(
        AlleleSelection::parse(&unescape(alleles)).map_err(|err| invalid_parameter("a", err))?,
      );
    }
    Ok(self)
  }

  /// Add sample groups in the order given, which is the order `AC#`/`AN#` refer to.
  pub fn with_groups<'a>(mut self, groups: impl IntoIterator<Item = &'a str>) -> Result<Self> {
    for group in groups {
      if self.query.groups().len() == MAX_GROUPS {
        return Err(invalid_parameter(
          "s",
          format!("at most {MAX_GROUPS} sample groups are allowed"),
        ));
      }

      self.query = self.query.with_group(
        SampleGroup::parse(&unescape(group)).map_err(|err| invalid_parameter("s", err))?,
      );
    }
    Ok(self)
  }

  pub fn with_sample_filter(mut self, filter: Option<&str>) -> Self {
    if let Some(filter) = filter.filter(|filter| !filter.trim().is_empty()) {
      self.query = self.query.with_sample_filter(unescape(filter));
    }
    self
  }
}
