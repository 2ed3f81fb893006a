//! A query session over a [`MemoryStore`](super::MemoryStore).
//!

use std::collections::BTreeSet;
use std::fmt::Write;
use std::sync::Arc;

use bgt_config::types::{
  AlleleSelection, AlleleSpec, MAX_GROUPS, OutputFlags, Region, SampleGroup, TableColumn,
};
use tracing::{debug, instrument, trace, warn};

use super::{Collection, MergedSite};
use crate::error::{Result, StoreError};
use crate::expr::{Expr, Value};
use crate::fmf::AnnotationDb;
use crate::types::{AlleleCounts, AlleleResolution, Call, GenotypePlanes, Record, SampleRef};
use crate::Session;

/// Session state. Configured by the setters, fixed by [`Session::prepare`] and then read.
#[derive(Debug)]
pub struct MemorySession {
  collection: Arc<Collection>,
  flags: OutputFlags,
  filter: Option<Expr>,
  region: Option<(usize, Region)>,
  start: u64,
  table: Option<Vec<TableColumn>>,
  alleles: Option<Vec<(usize, AlleleSpec)>>,
  groups: Vec<Vec<SampleRef>>,
  output: Vec<SampleRef>,
  masks: Vec<u8>,
  cursor: usize,
  passed: u64,
  genotype_limit: u64,
  genotypes_read: u64,
  limit_reached: bool,
  prepared: bool,
}

fn site_matches(site: &MergedSite, contig_id: usize, spec: &AlleleSpec) -> bool {
  site.contig_id == contig_id
    && site.position == spec.position()
    && site.reference_length == spec.reference_length()
    && (spec.is_reference() || site.alt == spec.allele())
}

impl MemorySession {
  pub(crate) fn new(collection: Arc<Collection>) -> Self {
    Self {
      collection,
      flags: OutputFlags::default(),
      filter: None,
      region: None,
      start: 1,
      table: None,
      alleles: None,
      groups: Vec::new(),
      output: Vec::new(),
      masks: Vec::new(),
      cursor: 0,
      passed: 0,
      genotype_limit: u64::MAX,
      genotypes_read: 0,
      limit_reached: false,
      prepared: false,
    }
  }

  fn all_samples(&self) -> impl Iterator<Item = SampleRef> + '_ {
    self
      .collection
      .panels
      .iter()
      .enumerate()
      .flat_map(|(file, panel)| (0..panel.sample_count()).map(move |row| SampleRef::new(file, row)))
  }

  /// Whether a spec names a site of the collection.
  fn is_present(&self, contig_id: usize, spec: &AlleleSpec) -> bool {
    let sites = &self.collection.sites;
    sites[self.collection.first_site(contig_id, spec.position())..]
      .iter()
      .take_while(|site| site.contig_id == contig_id && site.position == spec.position())
      .any(|site| site_matches(site, contig_id, spec))
  }

  fn expression_alleles(selection: &str, annotations: Option<&AnnotationDb>) -> Result<Vec<AlleleSpec>> {
    let db = annotations.ok_or_else(|| {
      StoreError::invalid_input("allele expressions need a variant annotation database")
    })?;
    let expr: Expr = selection.parse()?;

    Ok(
      (0..db.len())
        .filter(|row| db.test(*row, &expr))
        .filter_map(|row| {
          let name = db.row(row)?.name();
          name
            .parse::<AlleleSpec>()
            .inspect_err(|err| warn!(name, %err, "skipping annotation row"))
            .ok()
        })
        .collect(),
    )
  }

  /// The index to start scanning from.
  fn first_cursor(&self) -> usize {
    match &self.region {
      Some((contig_id, region)) => {
        let start = region
          .start()
          .unwrap_or(1)
          .saturating_sub(self.collection.max_reference_length.saturating_sub(1))
          .max(1);
        self.collection.first_site(*contig_id, start)
      }
      None => 0,
    }
  }

  fn site_passes(&self, site: &MergedSite) -> bool {
    let in_region = self.region.as_ref().is_none_or(|(contig_id, region)| {
      site.contig_id == *contig_id
        && region.overlaps(
          site.position,
          site.position + site.reference_length.max(1) - 1,
        )
    });

    in_region
      && self.alleles.as_ref().is_none_or(|alleles| {
        alleles
          .iter()
          .any(|(contig_id, spec)| site_matches(site, *contig_id, spec))
      })
  }

  /// Whether the scan has moved past the region.
  fn past_region(&self, site: &MergedSite) -> bool {
    self.region.as_ref().is_some_and(|(contig_id, region)| {
      site.contig_id > *contig_id || region.end().is_some_and(|end| site.position > end)
    })
  }

  fn planes(&self, site: &MergedSite) -> GenotypePlanes {
    let panels = &self.collection.panels;
    GenotypePlanes::from_calls(self.output.iter().flat_map(|sample| {
      let planes = site.sites[sample.file()].map(|index| &panels[sample.file()].sites[index].planes);
      [sample.row() << 1, sample.row() << 1 | 1]
        .map(|slot| planes.map_or(Call::Missing, |planes| planes.decode(slot)))
    }))
  }

  fn filter_value(counts: &AlleleCounts, name: &str) -> Option<Value> {
    match name {
      "AC" => Some(counts.count().into()),
      "AN" => Some(counts.number().into()),
      _ => {
        let group = |prefix: &str| name.strip_prefix(prefix)?.parse::<usize>().ok();
        if let Some(group) = group("AC") {
          counts.group(group).map(|(count, _)| count.into())
        } else if let Some(group) = group("AN") {
          counts.group(group).map(|(_, number)| number.into())
        } else {
          None
        }
      }
    }
  }

  fn info(&self, record: &Record) -> String {
    let mut info = Vec::new();

    if record.reference_length() != record.reference().len() as u64 {
      info.push(format!("END={}", record.end()));
    }

    if self.flags.allele_counts() {
      let counts = record.counts();
      info.push(format!("AC={}", counts.count()));
      info.push(format!("AN={}", counts.number()));

      for group in 1..=counts.group_count() {
        if let Some((count, number)) = counts.group(group) {
          info.push(format!("AC{group}={count}"));
          info.push(format!("AN{group}={number}"));
        }
      }
    }

    if info.is_empty() {
      ".".to_string()
    } else {
      info.join(";")
    }
  }
}

impl Session for MemorySession {
  fn set_flags(&mut self, flags: OutputFlags) {
    self.flags = flags;
  }

  fn set_site_filter(&mut self, filter: &str) -> Result<()> {
    self.filter = Some(filter.parse()?);
    Ok(())
  }

  fn set_region(&mut self, region: &Region) -> Result<()> {
    let contig_id = self.contig_id(region.chromosome()).ok_or_else(|| {
      StoreError::invalid_input(format!("unknown chromosome `{}`", region.chromosome()))
    })?;

    self.region = Some((contig_id, region.clone()));
    Ok(())
  }

  fn set_start(&mut self, start: u64) -> Result<()> {
    if start == 0 {
      return Err(StoreError::invalid_input("start record must be 1 or later"));
    }

    self.start = start;
    Ok(())
  }

  fn set_genotype_limit(&mut self, limit: u64) {
    self.genotype_limit = limit;
  }

  fn set_table(&mut self, columns: &[TableColumn]) -> Result<()> {
    if columns.is_empty() {
      return Err(StoreError::invalid_input("no table columns"));
    }

    self.table = Some(columns.to_vec());
    Ok(())
  }

  #[instrument(level = "debug", skip(self, annotations), err)]
  fn set_alleles(
    &mut self,
    alleles: &AlleleSelection,
    annotations: Option<&AnnotationDb>,
  ) -> Result<AlleleResolution> {
    let requested = match alleles {
      AlleleSelection::List(list) => list.clone(),
      AlleleSelection::Expression(expression) => {
        Self::expression_alleles(expression, annotations)?
      }
    };

    let mut resolved: Vec<(usize, AlleleSpec)> = Vec::new();
    for spec in requested {
      if resolved.iter().any(|(_, existing)| *existing == spec) {
        continue;
      }

      match self.contig_id(spec.chromosome()) {
        Some(contig_id) if self.is_present(contig_id, &spec) => resolved.push((contig_id, spec)),
        _ => trace!(%spec, "allele not in collection"),
      }
    }

    debug!(alleles = resolved.len(), "resolved alleles");
    if resolved.is_empty() {
      return Ok(AlleleResolution::NoMatches);
    }

    let specs = resolved.iter().map(|(_, spec)| spec.clone()).collect();
    self.alleles = Some(resolved);

    Ok(AlleleResolution::Resolved(specs))
  }

  #[instrument(level = "debug", skip(self), err)]
  fn add_group(&mut self, group: &SampleGroup) -> Result<usize> {
    if self.groups.len() >= MAX_GROUPS {
      return Err(StoreError::invalid_input(format!(
        "at most {MAX_GROUPS} sample groups are supported"
      )));
    }

    let samples: Vec<SampleRef> = match group {
      SampleGroup::List(names) => {
        let mut samples = Vec::new();
        for name in names {
          let found: Vec<_> = self
            .collection
            .panels
            .iter()
            .enumerate()
            .filter_map(|(file, panel)| panel.samples().find(name).map(|row| SampleRef::new(file, row)))
            .collect();

          if found.is_empty() {
            warn!(name = name.as_str(), "sample not found");
          }
          samples.extend(found);
        }
        samples
      }
      SampleGroup::Expression(expression) => {
        let expr: Expr = expression.parse()?;
        self
          .all_samples()
          .filter(|sample| {
            self.collection.panels[sample.file()]
              .samples()
              .test(sample.row(), &expr)
          })
          .collect()
      }
    };

    self.groups.push(samples);
    Ok(self.groups.len())
  }

  fn prepare(&mut self) -> Result<()> {
    if let Some(group) = self
      .table
      .iter()
      .flatten()
      .filter_map(TableColumn::group)
      .find(|group| *group > self.groups.len())
    {
      return Err(StoreError::invalid_input(format!(
        "table column refers to undefined sample group {group}"
      )));
    }

    self.output = if self.groups.is_empty() {
      self.all_samples().collect()
    } else {
      self
        .groups
        .iter()
        .flatten()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
    };

    self.masks = self
      .output
      .iter()
      .map(|sample| {
        self
          .groups
          .iter()
          .enumerate()
          .filter(|(_, group)| group.contains(sample))
          .fold(0u8, |mask, (group, _)| mask | 1 << group)
      })
      .collect();

    self.cursor = self.first_cursor();
    self.passed = 0;
    self.prepared = true;

    debug!(
      samples = self.output.len(),
      groups = self.groups.len(),
      "prepared session"
    );
    Ok(())
  }

  fn group_sizes(&self) -> Vec<usize> {
    self
      .groups
      .iter()
      .map(|group| group.iter().collect::<BTreeSet<_>>().len())
      .collect()
  }

  fn header(&self) -> String {
    let mut header = String::from("##fileformat=VCFv4.1\n");
    header.push_str(
      "##INFO=<ID=END,Number=1,Type=Integer,Description=\"Ending position\">\n\
       ##INFO=<ID=AC,Number=A,Type=Integer,Description=\"Count of alternate alleles\">\n\
       ##INFO=<ID=AN,Number=1,Type=Integer,Description=\"Number of called alleles\">\n",
    );

    for group in 1..=self.groups.len() {
      let _ = writeln!(
        header,
        "##INFO=<ID=AC{group},Number=A,Type=Integer,Description=\"Count of alternate alleles in sample group {group}\">\n\
         ##INFO=<ID=AN{group},Number=1,Type=Integer,Description=\"Number of called alleles in sample group {group}\">"
      );
    }

    header.push_str(
      "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
       ##ALT=<ID=M,Description=\"Missing or other alleles\">\n",
    );

    for (contig, length) in &self.collection.contigs {
      let _ = match length {
        Some(length) => writeln!(header, "##contig=<ID={contig},length={length}>"),
        None => writeln!(header, "##contig=<ID={contig}>"),
      };
    }

    header.push_str("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO");
    if self.flags.genotypes() {
      header.push_str("\tFORMAT");
      for sample in &self.output {
        if let Some(row) = self.collection.panels[sample.file()].samples().row(sample.row()) {
          header.push('\t');
          header.push_str(row.name());
        }
      }
    }
    header.push('\n');

    header
  }

  fn contig_id(&self, name: &str) -> Option<usize> {
    self.collection.contig_ids.get(name).copied()
  }

  fn slot_count(&self) -> usize {
    self.output.len() << 1
  }

  fn output_sample(&self, sample: usize) -> Option<SampleRef> {
    self.output.get(sample).copied()
  }

  fn read(&mut self) -> Result<Option<Record>> {
    if !self.prepared {
      return Err(StoreError::internal_error("session read before prepare"));
    }

    let collection = self.collection.clone();
    while let Some(site) = collection.sites.get(self.cursor) {
      if self.past_region(site) {
        self.cursor = collection.sites.len();
        break;
      }
      if !self.site_passes(site) {
        self.cursor += 1;
        continue;
      }
      if self.genotypes_read >= self.genotype_limit {
        debug!(genotypes = self.genotypes_read, "genotype limit reached");
        self.limit_reached = true;
        break;
      }
      self.cursor += 1;

      let planes = self.planes(site);
      self.genotypes_read += (planes.slot_count() >> 1) as u64;
      let counts = AlleleCounts::from_planes(&planes, self.groups.len(), |sample| self.masks[sample]);

      if let Some(filter) = &self.filter {
        if !filter.test(&|name: &str| Self::filter_value(&counts, name)) {
          continue;
        }
      }

      self.passed += 1;
      if self.passed < self.start {
        continue;
      }

      let (contig, _) = &collection.contigs[site.contig_id];
      return Ok(Some(
        Record::new(
          site.contig_id,
          contig.as_str(),
          site.position,
          site.reference_length,
          site.reference.as_str(),
          site.alt.as_str(),
          planes,
        )
        .with_counts(counts),
      ));
    }

    Ok(None)
  }

  fn genotype_limit_reached(&self) -> bool {
    self.limit_reached
  }

  fn format_vcf(&self, record: &Record) -> String {
    let has_other = record.has_other();
    let mut line = format!(
      "{}\t{}\t.\t{}\t{}{}\t.\t.\t{}",
      record.contig(),
      record.position(),
      record.reference(),
      record.alt(),
      if has_other { ",<M>" } else { "" },
      self.info(record)
    );

    if self.flags.genotypes() {
      line.push_str("\tGT");
      let planes = record.planes();
      for sample in 0..planes.slot_count() >> 1 {
        let code = |slot: usize| match planes.decode(slot) {
          Call::Ref => '0',
          Call::Alt => '1',
          Call::Missing => '.',
          Call::Other => '2',
        };
        let _ = write!(line, "\t{}|{}", code(sample << 1), code(sample << 1 | 1));
      }
    }

    line
  }

  fn format_table(&self, record: &Record) -> Option<String> {
    let columns = self.table.as_ref()?;
    let counts = record.counts();
    let group = |group: usize, select: fn((u32, u32)) -> u32| {
      counts
        .group(group)
        .map_or_else(|| ".".to_string(), |value| select(value).to_string())
    };

    Some(
      columns
        .iter()
        .map(|column| match column {
          TableColumn::Chrom => record.contig().to_string(),
          TableColumn::Pos => record.position().to_string(),
          TableColumn::End => record.end().to_string(),
          TableColumn::Ref => record.reference().to_string(),
          TableColumn::Alt => record.alt().to_string(),
          TableColumn::AlleleCount => counts.count().to_string(),
          TableColumn::AlleleNumber => counts.number().to_string(),
          TableColumn::GroupAlleleCount(g) => group(*g, |(count, _)| count),
          TableColumn::GroupAlleleNumber(g) => group(*g, |(_, number)| number),
        })
        .collect::<Vec<_>>()
        .join("\t"),
    )
  }
}

impl Drop for MemorySession {
  fn drop(&mut self) {
    trace!(read = self.passed, "closing session");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Store;
  use crate::memory::tests::store;

  fn session() -> MemorySession {
    store().open_session().unwrap()
  }

  fn read_all(session: &mut MemorySession) -> Vec<Record> {
    let mut records = Vec::new();
    while let Some(record) = session.read().unwrap() {
      records.push(record);
    }
    records
  }

  fn positions(records: &[Record]) -> Vec<u64> {
    records.iter().map(Record::position).collect()
  }

  #[test]
  fn genotype_limit_counts_rejected_sites() {
    let mut session = session();
    session.set_site_filter("AC>100").unwrap();
    session.set_genotype_limit(6);
    session.prepare().unwrap();

    assert!(session.read().unwrap().is_none());
    assert!(session.genotype_limit_reached());
  }

  #[test]
  fn genotype_limit_stops_reading() {
    let mut session = session();
    session.set_genotype_limit(4);
    session.prepare().unwrap();

    assert_eq!(positions(&read_all(&mut session)), vec![100, 180]);
    assert!(session.genotype_limit_reached());
  }

  #[test]
  fn genotype_limit_not_reached() {
    let mut session = session();
    session.set_genotype_limit(15);
    session.prepare().unwrap();

    assert_eq!(read_all(&mut session).len(), 5);
    assert!(!session.genotype_limit_reached());
  }

  #[test]
  fn read_all_sites() {
    let mut session = session();
    session.prepare().unwrap();

    let records = read_all(&mut session);
    assert_eq!(positions(&records), vec![100, 180, 250, 151344, 160513]);
    assert_eq!(session.slot_count(), 6);
    assert_eq!(
      records[1].planes().calls().collect::<Vec<_>>(),
      vec![
        Call::Missing,
        Call::Missing,
        Call::Missing,
        Call::Missing,
        Call::Ref,
        Call::Alt
      ]
    );
  }

  #[test]
  fn read_before_prepare() {
    assert!(matches!(
      session().read(),
      Err(StoreError::InternalError(_))
    ));
  }

  #[test]
  fn region_restricts_sites() {
    let mut session = session();
    session
      .set_region(&Region::new("11", Some(150), Some(151344)))
      .unwrap();
    session.prepare().unwrap();

    assert_eq!(positions(&read_all(&mut session)), vec![180, 250, 151344]);
  }

  #[test]
  fn unknown_chromosome() {
    assert!(matches!(
      session().set_region(&Region::new("chrUn", None, None)),
      Err(StoreError::InvalidInput(_))
    ));
  }

  #[test]
  fn start_skips_filtered_records() {
    let mut session = session();
    session.set_site_filter("AC>=2").unwrap();
    session.set_start(2).unwrap();
    session.prepare().unwrap();

    // AC at 100, 250, 151344 and 160513 is 3, 3, 3 and 2.
    assert_eq!(positions(&read_all(&mut session)), vec![250, 151344, 160513]);
  }

  #[test]
  fn invalid_site_filter() {
    assert!(matches!(
      session().set_site_filter("AC>"),
      Err(StoreError::InvalidInput(_))
    ));
  }

  #[test]
  fn alleles_restrict_sites() {
    let mut session = session();
    let resolution = session
      .set_alleles(
        &AlleleSelection::parse(",11:151344:1:G,11:160513::G,11:999:1:T").unwrap(),
        None,
      )
      .unwrap();

    assert_eq!(
      resolution,
      AlleleResolution::Resolved(vec![
        AlleleSpec::new("11", 151344, 1, "G"),
        AlleleSpec::new("11", 160513, 1, "")
      ])
    );

    session.prepare().unwrap();
    assert_eq!(positions(&read_all(&mut session)), vec![151344, 160513]);
  }

  #[test]
  fn alleles_without_matches() {
    let resolution = session()
      .set_alleles(&AlleleSelection::parse(",11:999999999:1:X").unwrap(), None)
      .unwrap();

    assert_eq!(resolution, AlleleResolution::NoMatches);
  }

  #[test]
  fn allele_expression_over_annotations() {
    let db =
      AnnotationDb::from_reader("11:100:1:C\timpact:Z:HIGH\n11:250:1:A\timpact:Z:LOW\nbad\timpact:Z:HIGH\n".as_bytes())
        .unwrap();
    let resolution = session()
      .set_alleles(
        &AlleleSelection::Expression("impact==\"HIGH\"".to_string()),
        Some(&db),
      )
      .unwrap();

    assert_eq!(
      resolution,
      AlleleResolution::Resolved(vec![AlleleSpec::new("11", 100, 1, "C")])
    );
  }

  #[test]
  fn allele_expression_needs_annotations() {
    assert!(matches!(
      session().set_alleles(&AlleleSelection::Expression("impact".to_string()), None),
      Err(StoreError::InvalidInput(_))
    ));
  }

  #[test]
  fn groups_select_output_samples() {
    let mut session = session();
    assert_eq!(
      session
        .add_group(&SampleGroup::parse("population==\"FIN\"").unwrap())
        .unwrap(),
      1
    );
    assert_eq!(
      session
        .add_group(&SampleGroup::parse(",Z,X,missing").unwrap())
        .unwrap(),
      2
    );
    session.prepare().unwrap();

    assert_eq!(session.group_sizes(), vec![1, 2]);
    assert_eq!(session.output_sample(0), Some(SampleRef::new(0, 0)));
    assert_eq!(session.output_sample(1), Some(SampleRef::new(1, 0)));
    assert_eq!(session.output_sample(2), None);

    let record = session.read().unwrap().unwrap();
    assert_eq!(record.counts().count(), 3);
    assert_eq!(record.counts().number(), 4);
    assert_eq!(record.counts().group(1), Some((1, 2)));
    assert_eq!(record.counts().group(2), Some((3, 4)));
  }

  #[test]
  fn too_many_groups() {
    let mut session = session();
    for _ in 0..MAX_GROUPS {
      session.add_group(&SampleGroup::parse(",X").unwrap()).unwrap();
    }

    assert!(matches!(
      session.add_group(&SampleGroup::parse(",X").unwrap()),
      Err(StoreError::InvalidInput(_))
    ));
  }

  #[test]
  fn table_group_must_exist() {
    let mut session = session();
    session
      .set_table(&[TableColumn::Pos, TableColumn::GroupAlleleCount(1)])
      .unwrap();

    assert!(matches!(
      session.prepare(),
      Err(StoreError::InvalidInput(_))
    ));
  }

  #[test]
  fn vcf_header_and_lines() {
    let mut session = session();
    session.set_flags(OutputFlags::default().with_allele_counts(true));
    session.prepare().unwrap();

    let header = session.header();
    assert!(header.starts_with("##fileformat=VCFv4.1\n"));
    assert!(header.contains("##contig=<ID=11,length=135086622>\n"));
    assert!(header.ends_with("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tX\tY\tZ\n"));

    let record = session.read().unwrap().unwrap();
    assert_eq!(
      session.format_vcf(&record),
      "11\t100\t.\tA\tC\t.\t.\tAC=3;AN=6\tGT\t0|1\t0|0\t1|1"
    );

    let record = session.read().unwrap().unwrap();
    assert_eq!(
      session.format_vcf(&record),
      "11\t180\t.\tC\tCA\t.\t.\tAC=1;AN=2\tGT\t.|.\t.|.\t0|1"
    );
  }

  #[test]
  fn vcf_without_genotypes() {
    let mut session = session();
    session.set_flags(OutputFlags::default().with_genotypes(false));
    session.prepare().unwrap();

    assert!(session.header().ends_with("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n"));
    let record = session.read().unwrap().unwrap();
    assert_eq!(session.format_vcf(&record), "11\t100\t.\tA\tC\t.\t.\t.");
  }

  #[test]
  fn table_lines() {
    let mut session = session();
    session.add_group(&SampleGroup::parse(",Y").unwrap()).unwrap();
    session
      .set_table(&[
        TableColumn::Chrom,
        TableColumn::Pos,
        TableColumn::End,
        TableColumn::Alt,
        TableColumn::AlleleCount,
        TableColumn::GroupAlleleNumber(1),
      ])
      .unwrap();
    session.prepare().unwrap();

    let record = session.read().unwrap().unwrap();
    assert_eq!(
      session.format_table(&record),
      Some("11\t100\t100\tC\t0\t2".to_string())
    );
  }

  #[test]
  fn no_table_without_columns() {
    let mut session = session();
    session.prepare().unwrap();

    let record = session.read().unwrap().unwrap();
    assert_eq!(session.format_table(&record), None);
  }
}
