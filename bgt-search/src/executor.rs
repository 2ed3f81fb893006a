//! Applies a structured query to a store session and streams the rendered response.
//!

use std::collections::HashSet;
use std::sync::Arc;

use bgt_config::config::limits::Limits;
use bgt_config::types::{AlleleSelection, BgtError, Query, Result};
use bgt_storage::expr::Expr;
use bgt_storage::{AlleleResolution, Session, Store};
use tracing::{debug, instrument, trace};

use crate::haplotype::HaplotypeCounter;
use crate::listing::list_samples;
use crate::resolver::{SampleResolver, spanning_region};

/// The line appended when a response was cut short by a limit.
pub const TRUNCATION_MARKER: &str = "*\n";

/// Qualify a store error with the parameter that caused it.
fn rejected(parameter: &str, err: impl Into<BgtError>) -> BgtError {
  match err.into() {
    BgtError::InvalidInput(message) => {
      BgtError::invalid_input(format!("failed to apply parameter '{parameter}': {message}"))
    }
    err => err,
  }
}

/// The result of setting up a query.
pub enum Outcome<S: Store> {
  /// No allele selected by the query exists.
  NoContent(String),
  /// A response that needed no genotype scan.
  Complete(String),
  /// A prepared session, ready to stream.
  Ready(Execution<S>),
}

/// Executes queries against a shared store.
#[derive(Debug)]
pub struct QueryExecutor<S> {
  store: Arc<S>,
  limits: Limits,
}

impl<S> Clone for QueryExecutor<S> {
  fn clone(&self) -> Self {
    Self {
      store: self.store.clone(),
      limits: self.limits,
    }
  }
}

impl<S: Store> QueryExecutor<S> {
  /// Create a new executor.
  pub fn new(store: Arc<S>, limits: Limits) -> Self {
    Self { store, limits }
  }

  /// Get the store.
  pub fn store(&self) -> &S {
    &self.store
  }

  /// Get the limits.
  pub fn limits(&self) -> Limits {
    self.limits
  }

  /// Open a session and configure it for the query. This reads the collection, so it should not
  /// run on an async worker.
  #[instrument(level = "debug", skip(self))]
  pub fn execute(&self, query: &Query) -> Result<Outcome<S>> {
    if query.is_sample_listing() {
      return list_samples(self.store.as_ref(), query.sample_filter()).map(Outcome::Complete);
    }

    let mut session = self.store.open_session()?;

    let mut flags = query.flags();
    if !self.limits.genotypes_allowed() {
      flags = flags.with_genotypes(false);
    }
    session.set_flags(flags);
    session.set_genotype_limit(self.limits.max_genotypes());

    if let Some(filter) = query.site_filter() {
      session
        .set_site_filter(filter)
        .map_err(|err| rejected("f", err))?;
    }
    if let Some(region) = query.region() {
      session.set_region(region).map_err(|err| rejected("r", err))?;
    }
    if let Some(start) = query.start() {
      session.set_start(start).map_err(|err| rejected("i", err))?;
    }
    if let Some(table) = query.table() {
      session.set_table(table).map_err(|err| rejected("t", err))?;
    }

    let mut resolver = None;
    let mut haplotypes = None;
    if let Some(selection) = query.alleles() {
      if let (true, AlleleSelection::List(list)) = (flags.sample_list(), selection) {
        spanning_region(list).map_err(|err| rejected("a", err))?;
      }

      let alleles = match session
        .set_alleles(selection, self.store.variant_annotations())
        .map_err(|err| rejected("a", err))?
      {
        AlleleResolution::NoMatches => {
          return Ok(Outcome::NoContent(
            "no alleles matching parameter 'a'".to_string(),
          ));
        }
        AlleleResolution::Resolved(alleles) => alleles,
      };

      if flags.sample_list() {
        let required = match selection {
          AlleleSelection::List(list) => list.iter().collect::<HashSet<_>>().len(),
          AlleleSelection::Expression(_) => alleles.len(),
        };

        let mut sample_resolver = SampleResolver::new(alleles.clone(), required)?;
        if let Some(filter) = query.sample_filter() {
          let filter = filter
            .parse::<Expr>()
            .map_err(|err| rejected("q", BgtError::invalid_input(err.to_string())))?;
          sample_resolver = sample_resolver.with_filter(filter);
        }
        if query.region().is_none() {
          session
            .set_region(sample_resolver.region())
            .map_err(|err| rejected("a", err))?;
        }
        resolver = Some(sample_resolver);
      }

      if flags.haplotype_counts() {
        haplotypes = Some(HaplotypeCounter::new(alleles));
      }
    }

    for group in query.groups() {
      session.add_group(group).map_err(|err| rejected("s", err))?;
    }

    session.prepare().map_err(|err| rejected("t", err))?;

    let min_group_size = self.limits.min_group_size();
    if min_group_size > 0 {
      if resolver.is_some() {
        return Err(BgtError::permission_denied(
          "samples can't be listed by genotype when a minimum group size is set",
        ));
      }
      if session
        .group_sizes()
        .iter()
        .any(|size| *size < min_group_size)
      {
        return Err(BgtError::permission_denied(
          "genotype summary can't be computed for small sample groups",
        ));
      }
    }

    if let Some(resolver) = &mut resolver {
      resolver.bind(&session);
    }
    if let Some(haplotypes) = &mut haplotypes {
      haplotypes.bind(&session);
    }

    debug!(
      samples = session.slot_count() >> 1,
      groups = ?session.group_sizes(),
      "session ready"
    );

    Ok(Outcome::Ready(Execution {
      store: self.store.clone(),
      session,
      vcf: query.is_vcf_output(),
      max_records: query.max_records().unwrap_or(u64::MAX),
      resolver,
      haplotypes,
    }))
  }
}

/// A prepared query. Dropping it closes the session.
pub struct Execution<S: Store> {
  store: Arc<S>,
  session: S::Session,
  vcf: bool,
  max_records: u64,
  resolver: Option<SampleResolver>,
  haplotypes: Option<HaplotypeCounter>,
}

impl<S: Store> Execution<S> {
  /// Scan the session, passing each rendered piece of the response to `emit`. The scan stops
  /// early when `emit` returns false.
  ///
  /// At most `max_records` records are read, and the session stops reading once the genotype
  /// ceiling is reached. If records remain after either limit, the truncation marker ends the
  /// response.
  #[instrument(level = "debug", skip_all)]
  pub fn run<F>(mut self, mut emit: F) -> Result<()>
  where
    F: FnMut(String) -> bool,
  {
    if self.vcf && !emit(self.session.header()) {
      return Ok(());
    }

    let mut emitted = 0u64;
    let truncated = loop {
      if emitted >= self.max_records {
        break self.session.read()?.is_some() || self.session.genotype_limit_reached();
      }

      let Some(record) = self.session.read()? else {
        break self.session.genotype_limit_reached();
      };

      if let Some(resolver) = &mut self.resolver {
        resolver.observe(&record);
      }
      if let Some(haplotypes) = &mut self.haplotypes {
        haplotypes.observe(&record);
      }

      let line = if self.vcf {
        Some(self.session.format_vcf(&record))
      } else {
        self.session.format_table(&record)
      };

      if let Some(mut line) = line {
        line.push('\n');
        if !emit(line) {
          debug!(emitted, "client went away");
          return Ok(());
        }
      }

      emitted += 1;
    };

    trace!(emitted, truncated, "scan finished");

    if !self.vcf {
      if let Some(haplotypes) = &self.haplotypes {
        emit(haplotypes.render());
      }
      if let Some(resolver) = &self.resolver {
        emit(resolver.render(&self.session, self.store.as_ref()));
      }
    }

    if truncated {
      emit(TRUNCATION_MARKER.to_string());
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use bgt_config::types::{OutputFlags, Region, SampleGroup, TableColumn};
  use bgt_test::util::test_store;

  use super::*;

  fn executor(limits: Limits) -> QueryExecutor<bgt_storage::memory::MemoryStore> {
    QueryExecutor::new(Arc::new(test_store()), limits)
  }

  fn run_with(limits: Limits, query: Query) -> Result<String> {
    match executor(limits).execute(&query)? {
      Outcome::NoContent(message) => Ok(format!("204 {message}")),
      Outcome::Complete(text) => Ok(text),
      Outcome::Ready(execution) => {
        let mut out = String::new();
        execution.run(|chunk| {
          out.push_str(&chunk);
          true
        })?;
        Ok(out)
      }
    }
  }

  fn run(query: Query) -> Result<String> {
    run_with(Limits::default(), query)
  }

  fn records(out: &str) -> Vec<&str> {
    out.lines().filter(|line| !line.starts_with('#')).collect()
  }

  #[test]
  fn vcf_with_every_record() {
    let out = run(Query::default()).unwrap();

    assert!(out.starts_with("##fileformat=VCFv4.1\n"));
    assert!(out.contains("\tFORMAT\tX\tY\tZ\n"));
    assert_eq!(records(&out).len(), 6);
    assert!(!out.ends_with("*\n"));
  }

  #[test]
  fn max_records_truncates() {
    let out = run(Query::default().with_max_records(2)).unwrap();
    let lines = records(&out);

    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("11\t250\t"));
    assert_eq!(lines[2], "*");
  }

  #[test]
  fn max_records_equal_to_total() {
    let out = run(Query::default().with_max_records(6)).unwrap();

    assert_eq!(records(&out).len(), 6);
    assert!(!out.ends_with("*\n"));
  }

  #[test]
  fn genotype_ceiling_truncates() {
    let out = run_with(Limits::default().with_max_genotypes(4), Query::default()).unwrap();

    // Three samples per record, so the ceiling is passed after two records.
    assert_eq!(records(&out).len(), 3);
    assert!(out.ends_with("*\n"));
  }

  #[test]
  fn genotype_ceiling_counts_filtered_records() {
    let out = run_with(
      Limits::default().with_max_genotypes(6),
      Query::default()
        .with_site_filter("AC>100")
        .with_table(vec![TableColumn::Pos]),
    )
    .unwrap();

    assert_eq!(out, TRUNCATION_MARKER);

    let out = run(
      Query::default()
        .with_site_filter("AC>100")
        .with_table(vec![TableColumn::Pos]),
    )
    .unwrap();

    assert_eq!(out, "");
  }

  #[test]
  fn table_from_start() {
    let out = run(
      Query::default()
        .with_table(vec![TableColumn::Pos, TableColumn::AlleleCount])
        .with_region(Region::new("11", Some(100), Some(200000)))
        .with_start(4),
    )
    .unwrap();

    assert_eq!(out, "160513\t2\n200000\t1\n");
  }

  #[test]
  fn site_filter_on_group_counts() {
    let out = run(
      Query::default()
        .with_flags(OutputFlags::default().with_allele_counts(true))
        .with_group(SampleGroup::parse(",Z").unwrap())
        .with_site_filter("AC1>0")
        .with_table(vec![TableColumn::Pos, TableColumn::GroupAlleleCount(1)]),
    )
    .unwrap();

    assert_eq!(out, "100\t2\n");
  }

  #[test]
  fn unknown_chromosome() {
    assert!(matches!(
      run(Query::default().with_region(Region::new("chrUn", None, None))),
      Err(BgtError::InvalidInput(_))
    ));
  }

  #[test]
  fn invalid_site_filter() {
    assert!(matches!(
      run(Query::default().with_site_filter("AC >")),
      Err(BgtError::InvalidInput(message)) if message.contains("'f'")
    ));
  }

  #[test]
  fn no_matching_alleles() {
    let out = run(
      Query::default().with_alleles(AlleleSelection::parse(",11:999999999:1:X").unwrap()),
    )
    .unwrap();

    assert_eq!(out, "204 no alleles matching parameter 'a'");
  }

  #[test]
  fn samples_with_every_allele() {
    let out = run(
      Query::default()
        .with_flags(OutputFlags::default().with_sample_list(true))
        .with_alleles(AlleleSelection::parse(",11:151344:1:G,11:160513::G").unwrap()),
    )
    .unwrap();

    assert_eq!(out, "X\t1\n");
  }

  #[test]
  fn samples_restricted_by_filter() {
    let out = run(
      Query::default()
        .with_flags(OutputFlags::default().with_sample_list(true))
        .with_alleles(AlleleSelection::parse(",11:100:1:C").unwrap())
        .with_sample_filter("population==\"FIN\" && gender==2"),
    )
    .unwrap();

    assert_eq!(out, "Z\t2\n");
  }

  #[test]
  fn samples_from_allele_expression() {
    let out = run(
      Query::default()
        .with_flags(OutputFlags::default().with_sample_list(true))
        .with_alleles(AlleleSelection::parse("gene==\"ABC\"").unwrap()),
    )
    .unwrap();

    // 11:160513:1:T is carried by Y only, and 11:151344:1:G by X and Y.
    assert_eq!(out, "Y\t1\n");
  }

  #[test]
  fn alleles_on_different_chromosomes() {
    assert!(matches!(
      run(
        Query::default()
          .with_flags(OutputFlags::default().with_sample_list(true))
          .with_alleles(AlleleSelection::parse(",11:100:1:C,20:5000:1:G").unwrap())
      ),
      Err(BgtError::InvalidInput(_))
    ));
  }

  #[test]
  fn missing_allele_on_another_chromosome() {
    assert!(matches!(
      run(
        Query::default()
          .with_flags(OutputFlags::default().with_sample_list(true))
          .with_alleles(AlleleSelection::parse(",11:151344:1:G,20:999:1:T").unwrap())
      ),
      Err(BgtError::InvalidInput(message)) if message.contains("'a'")
    ));
  }

  #[test]
  fn sample_filter_narrows_groups() {
    let query = Query::default()
      .with_flags(OutputFlags::default().with_sample_list(true))
      .with_alleles(AlleleSelection::parse(",11:100:1:C").unwrap())
      .with_group(SampleGroup::parse(",X").unwrap());

    assert_eq!(run(query.clone()).unwrap(), "X\t1\n");
    assert_eq!(run(query.clone().with_sample_filter("gender==2")).unwrap(), "");
    assert_eq!(run(query.with_sample_filter("gender==1")).unwrap(), "X\t1\n");
  }

  #[test]
  fn invalid_sample_filter() {
    assert!(matches!(
      run(
        Query::default()
          .with_flags(OutputFlags::default().with_sample_list(true))
          .with_alleles(AlleleSelection::parse(",11:100:1:C").unwrap())
          .with_sample_filter("gender ==")
      ),
      Err(BgtError::InvalidInput(message)) if message.contains("'q'")
    ));
  }

  #[test]
  fn sample_listing_without_alleles() {
    let out = run(Query::default().with_flags(OutputFlags::default().with_sample_list(true))).unwrap();
    assert_eq!(out, "X\t1\nY\t1\nZ\t2\n");

    let out = run(Query::default().with_sample_filter("population==\"CEU\"")).unwrap();
    assert_eq!(out, "Y\t1\n");
  }

  #[test]
  fn haplotype_counts() {
    let out = run(
      Query::default()
        .with_flags(OutputFlags::default().with_haplotype_counts(true))
        .with_alleles(AlleleSelection::parse(",11:100:1:C,11:250:1:A").unwrap()),
    )
    .unwrap();

    assert_eq!(
      out,
      "##allele1=11:100:1:C\n##allele2=11:250:1:A\n#HAP\tCOUNT\n01\t2\n10\t2\n00\t1\n11\t1\n"
    );
  }

  #[test]
  fn small_groups_are_rejected() {
    let limits = Limits::default().with_min_group_size(2);

    assert!(matches!(
      run_with(
        limits,
        Query::default().with_group(SampleGroup::parse(",X").unwrap())
      ),
      Err(BgtError::PermissionDenied(_))
    ));

    let out = run_with(
      limits,
      Query::default().with_group(SampleGroup::parse(",X,Y").unwrap()),
    )
    .unwrap();
    assert!(out.contains("\tINFO\n"));
    assert!(!out.contains("\tGT"));
  }

  #[test]
  fn sample_matching_with_group_limit() {
    assert!(matches!(
      run_with(
        Limits::default().with_min_group_size(1),
        Query::default()
          .with_flags(OutputFlags::default().with_sample_list(true))
          .with_alleles(AlleleSelection::parse(",11:100:1:C").unwrap())
      ),
      Err(BgtError::PermissionDenied(_))
    ));
  }

  #[test]
  fn emit_stops_the_scan() {
    let Outcome::Ready(execution) = executor(Limits::default())
      .execute(&Query::default())
      .unwrap()
    else {
      panic!("expected a prepared execution");
    };

    let mut chunks = 0;
    execution
      .run(|_| {
        chunks += 1;
        chunks < 2
      })
      .unwrap();

    assert_eq!(chunks, 2);
  }
}
