//! A small two-panel collection shared by the tests of every crate.
//!
//! `panel1` holds samples `X` and `Y`, `panel2` holds `Z`. At `11:151344:1:G` sample `X` is
//! `0|1` and `Y` is `1|1`; at `11:160513` `X` is `0|0` and `Y` is `1|1`, so `X` is the only
//! sample carrying the alternate at the first site and the reference at the second.
//!

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use bgt_config::config::collection::CollectionConfig;
use bgt_storage::fmf::AnnotationDb;
use bgt_storage::memory::{MemoryStore, Panel};
use noodles::bgzf;
use tempfile::TempDir;

pub const PANEL1_VCF: &str = "\
##fileformat=VCFv4.2
##contig=<ID=11,length=135086622>
##contig=<ID=20,length=64444167>
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tX\tY
11\t100\t.\tA\tC\t.\tPASS\t.\tGT\t0|1\t0|0
11\t250\t.\tT\tA\t.\tPASS\t.\tGT\t1|1\t0|1
11\t151344\t.\tA\tG\t.\tPASS\t.\tGT\t0|1\t1|1
11\t160513\t.\tG\tT\t.\tPASS\t.\tGT\t0|0\t1|1
11\t200000\t.\tC\tT\t.\tPASS\t.\tGT\t0|0\t0|1
20\t5000\t.\tA\tG\t.\tPASS\t.\tGT\t0|0\t0|0
";

pub const PANEL1_SAMPLES: &str = "\
X\tpopulation:Z:FIN\tgender:i:1
Y\tpopulation:Z:CEU\tgender:i:2
";

pub const PANEL2_VCF: &str = "\
##fileformat=VCFv4.2
##contig=<ID=11,length=135086622>
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tZ
11\t100\t.\tA\tC\t.\tPASS\t.\tGT\t1|1
11\t250\t.\tT\tA\t.\tPASS\t.\tGT\t0|0
";

pub const PANEL2_SAMPLES: &str = "Z\tpopulation:Z:FIN\tgender:i:2\n";

pub const VARIANT_ANNOTATIONS: &str = "\
11:151344:1:G\tgene:Z:ABC\timpact:Z:HIGH
11:160513:1:T\tgene:Z:ABC\timpact:Z:LOW
11:999:1:A\tgene:Z:XYZ\timpact:Z:HIGH
";

fn annotations(text: &str) -> AnnotationDb {
  AnnotationDb::from_reader(text.as_bytes()).unwrap()
}

/// The two test panels.
pub fn test_panels() -> Vec<Panel> {
  vec![
    Panel::from_reader(
      "panel1",
      PANEL1_VCF.as_bytes(),
      Some(&annotations(PANEL1_SAMPLES)),
    )
    .unwrap(),
    Panel::from_reader(
      "panel2",
      PANEL2_VCF.as_bytes(),
      Some(&annotations(PANEL2_SAMPLES)),
    )
    .unwrap(),
  ]
}

/// The test collection, with variant annotations.
pub fn test_store() -> MemoryStore {
  MemoryStore::new(test_panels(), Some(annotations(VARIANT_ANNOTATIONS)))
}

/// Write the test collection to a directory: `panel1` as BGZF-compressed VCF and `panel2` as plain
/// VCF, both with `.spl` sample annotations, plus a variant annotation file.
pub fn write_test_collection<P: AsRef<Path>>(path: P) -> CollectionConfig {
  let path = path.as_ref();

  let mut writer = bgzf::io::Writer::new(File::create(path.join("panel1.vcf.gz")).unwrap());
  writer.write_all(PANEL1_VCF.as_bytes()).unwrap();
  writer.finish().unwrap();

  fs::write(path.join("panel1.spl"), PANEL1_SAMPLES).unwrap();
  fs::write(path.join("panel2.vcf"), PANEL2_VCF).unwrap();
  fs::write(path.join("panel2.spl"), PANEL2_SAMPLES).unwrap();

  let variant_annotations = path.join("variants.fmf");
  fs::write(&variant_annotations, VARIANT_ANNOTATIONS).unwrap();

  CollectionConfig::new(
    vec![path.join("panel1"), path.join("panel2")],
    Some(variant_annotations),
  )
}

/// Create a temporary directory holding the test collection.
pub fn test_collection_dir() -> (TempDir, Vec<PathBuf>) {
  let dir = TempDir::new().unwrap();
  let config = write_test_collection(dir.path());
  let files = config.files().to_vec();

  (dir, files)
}

#[cfg(test)]
mod tests {
  use bgt_storage::Store;

  use super::*;

  #[test]
  fn store_from_files_matches_fixture() {
    let dir = TempDir::new().unwrap();
    let config = write_test_collection(dir.path());
    let store = MemoryStore::open(&config).unwrap();

    assert_eq!(store.file_count(), 2);
    assert_eq!(store.file_name(0), Some("panel1"));
    assert_eq!(store.sample_annotations(1).unwrap().keys(), &["population", "gender"]);
    assert_eq!(store.variant_annotations().unwrap().len(), 3);
  }
}
