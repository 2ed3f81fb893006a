//! An in-memory [`Store`] over VCF panels. Sites of all panels are merged once on load, so a
//! session reads a single sorted site list.
//!

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bgt_config::config::collection::CollectionConfig;
use tracing::{info, instrument};

pub use panel::Panel;
pub use session::MemorySession;

use crate::error::{Result, StoreError};
use crate::fmf::AnnotationDb;
use crate::{SampleRef, Store};

pub mod panel;
pub mod session;

/// A site merged across panels. `sites` holds, per panel, the index of the panel site carrying
/// this allele.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MergedSite {
  pub(crate) contig_id: usize,
  pub(crate) position: u64,
  pub(crate) reference_length: u64,
  pub(crate) reference: String,
  pub(crate) alt: String,
  pub(crate) sites: Vec<Option<usize>>,
}

/// The loaded collection shared by every session.
#[derive(Debug)]
pub(crate) struct Collection {
  pub(crate) panels: Vec<Panel>,
  pub(crate) contigs: Vec<(String, Option<usize>)>,
  pub(crate) contig_ids: HashMap<String, usize>,
  pub(crate) sites: Vec<MergedSite>,
  pub(crate) max_reference_length: u64,
}

impl Collection {
  fn new(panels: Vec<Panel>) -> Self {
    let mut contigs: Vec<(String, Option<usize>)> = Vec::new();
    let mut contig_ids = HashMap::new();

    for (name, length) in panels.iter().flat_map(|panel| panel.contigs()) {
      if !contig_ids.contains_key(name) {
        contig_ids.insert(name.clone(), contigs.len());
        contigs.push((name.clone(), *length));
      }
    }

    let mut merged: BTreeMap<(usize, u64, u64, String), MergedSite> = BTreeMap::new();
    for (panel_index, panel) in panels.iter().enumerate() {
      for (site_index, site) in panel.sites.iter().enumerate() {
        // Every site contig was added to the panel contigs while loading.
        let Some(&contig_id) = contig_ids.get(&site.contig) else {
          continue;
        };

        merged
          .entry((
            contig_id,
            site.position,
            site.reference_length,
            site.alt.clone(),
          ))
          .or_insert_with(|| MergedSite {
            contig_id,
            position: site.position,
            reference_length: site.reference_length,
            reference: site.reference.clone(),
            alt: site.alt.clone(),
            sites: vec![None; panels.len()],
          })
          .sites[panel_index] = Some(site_index);
      }
    }

    let sites: Vec<_> = merged.into_values().collect();
    let max_reference_length = sites
      .iter()
      .map(|site| site.reference_length)
      .max()
      .unwrap_or(1);

    Self {
      panels,
      contigs,
      contig_ids,
      sites,
      max_reference_length,
    }
  }

  /// The index of the first site at or after a position on a contig.
  pub(crate) fn first_site(&self, contig_id: usize, position: u64) -> usize {
    self
      .sites
      .partition_point(|site| (site.contig_id, site.position) < (contig_id, position))
  }
}

/// A store holding every panel of the collection in memory.
#[derive(Debug, Clone)]
pub struct MemoryStore {
  collection: Arc<Collection>,
  variant_annotations: Option<Arc<AnnotationDb>>,
}

impl MemoryStore {
  /// Create a store from loaded panels.
  pub fn new(panels: Vec<Panel>, variant_annotations: Option<AnnotationDb>) -> Self {
    Self {
      collection: Arc::new(Collection::new(panels)),
      variant_annotations: variant_annotations.map(Arc::new),
    }
  }

  /// Open every panel of the collection config.
  #[instrument(level = "debug", skip_all, err)]
  pub fn open(config: &CollectionConfig) -> Result<Self> {
    if config.files().is_empty() {
      return Err(StoreError::invalid_input("no BGT files configured"));
    }

    let panels = config
      .files()
      .iter()
      .map(|prefix| Panel::open(prefix))
      .collect::<Result<Vec<_>>>()?;

    let variant_annotations = config
      .variant_annotations()
      .map(AnnotationDb::read)
      .transpose()?;

    let store = Self::new(panels, variant_annotations);
    info!(
      files = store.file_count(),
      sites = store.collection.sites.len(),
      "opened collection"
    );

    Ok(store)
  }
}

impl Store for MemoryStore {
  type Session = MemorySession;

  fn open_session(&self) -> Result<Self::Session> {
    Ok(MemorySession::new(self.collection.clone()))
  }

  fn file_count(&self) -> usize {
    self.collection.panels.len()
  }

  fn file_name(&self, file: usize) -> Option<&str> {
    self.collection.panels.get(file).map(Panel::name)
  }

  fn sample_annotations(&self, file: usize) -> Option<&AnnotationDb> {
    self.collection.panels.get(file).map(Panel::samples)
  }

  fn variant_annotations(&self) -> Option<&AnnotationDb> {
    self.variant_annotations.as_deref()
  }

  fn sample_name(&self, sample: SampleRef) -> Option<&str> {
    self
      .collection
      .panels
      .get(sample.file())?
      .samples()
      .row(sample.row())
      .map(|row| row.name())
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  pub(crate) const PANEL1: &str = "\
##fileformat=VCFv4.2
##contig=<ID=11,length=135086622>
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tX\tY
11\t100\t.\tA\tC\t.\tPASS\t.\tGT\t0|1\t0|0
11\t250\t.\tT\tA\t.\tPASS\t.\tGT\t1|1\t0|1
11\t151344\t.\tA\tG\t.\tPASS\t.\tGT\t0|1\t1|1
11\t160513\t.\tG\tT\t.\tPASS\t.\tGT\t0|0\t1|1
";

  pub(crate) const PANEL2: &str = "\
##fileformat=VCFv4.2
##contig=<ID=11,length=135086622>
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tZ
11\t100\t.\tA\tC\t.\tPASS\t.\tGT\t1|1
11\t180\t.\tC\tCA\t.\tPASS\t.\tGT\t0|1
";

  pub(crate) const SAMPLES1: &str = "X\tpopulation:Z:FIN\tgender:i:1\nY\tpopulation:Z:CEU\tgender:i:2\n";

  pub(crate) fn store() -> MemoryStore {
    let samples = AnnotationDb::from_reader(SAMPLES1.as_bytes()).unwrap();
    MemoryStore::new(
      vec![
        Panel::from_reader("panel1", PANEL1.as_bytes(), Some(&samples)).unwrap(),
        Panel::from_reader("panel2", PANEL2.as_bytes(), None).unwrap(),
      ],
      None,
    )
  }

  #[test]
  fn sites_are_merged_in_order() {
    let store = store();
    let sites: Vec<_> = store
      .collection
      .sites
      .iter()
      .map(|site| (site.position, site.alt.as_str(), site.sites.clone()))
      .collect();

    assert_eq!(
      sites,
      vec![
        (100, "C", vec![Some(0), Some(0)]),
        (180, "CA", vec![None, Some(1)]),
        (250, "A", vec![Some(1), None]),
        (151344, "G", vec![Some(2), None]),
        (160513, "T", vec![Some(3), None]),
      ]
    );
  }

  #[test]
  fn first_site_at_position() {
    let store = store();

    assert_eq!(store.collection.first_site(0, 1), 0);
    assert_eq!(store.collection.first_site(0, 200), 2);
    assert_eq!(store.collection.first_site(0, 200000), 5);
  }

  #[test]
  fn store_files_and_samples() {
    let store = store();

    assert_eq!(store.file_count(), 2);
    assert_eq!(store.file_name(1), Some("panel2"));
    assert_eq!(store.sample_name(SampleRef::new(0, 1)), Some("Y"));
    assert_eq!(store.sample_name(SampleRef::new(1, 0)), Some("Z"));
    assert_eq!(store.sample_name(SampleRef::new(1, 1)), None);
    assert_eq!(
      store.sample_annotations(0).unwrap().keys(),
      &["population", "gender"]
    );
    assert!(store.variant_annotations().is_none());
  }

  #[test]
  fn open_requires_files() {
    assert!(matches!(
      MemoryStore::open(&CollectionConfig::default()),
      Err(StoreError::InvalidInput(_))
    ));
  }
}
