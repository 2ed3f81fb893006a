//! A single panel of the collection, loaded from a VCF file.
//!

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::iter;
use std::path::{Path, PathBuf};

use noodles::vcf::variant::RecordBuf;
use noodles::vcf::variant::record::info::field::key as info_key;
use noodles::vcf::variant::record::samples::keys::key as format_key;
use noodles::vcf::variant::record_buf::info::field::Value as InfoValue;
use noodles::vcf::variant::record_buf::samples::sample::Value as SampleValue;
use noodles::{bgzf, vcf};
use tracing::{debug, instrument, trace};

use crate::error::{Result, StoreError};
use crate::fmf::AnnotationDb;
use crate::types::{Call, GenotypePlanes};

/// A biallelic site of one panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Site {
  pub(crate) contig: String,
  pub(crate) position: u64,
  pub(crate) reference_length: u64,
  pub(crate) reference: String,
  pub(crate) alt: String,
  pub(crate) planes: GenotypePlanes,
}

/// Samples, contigs and sites of one file.
#[derive(Debug, Clone)]
pub struct Panel {
  name: String,
  samples: AnnotationDb,
  contigs: Vec<(String, Option<usize>)>,
  pub(crate) sites: Vec<Site>,
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
  let mut path = OsString::from(prefix.as_os_str());
  path.push(suffix);
  path.into()
}

impl Panel {
  /// Open a panel from a file prefix. Genotypes are read from `<prefix>.vcf.gz`, `<prefix>.vcf` or
  /// `<prefix>` itself, and sample annotations from `<prefix>.spl` if it exists.
  #[instrument(level = "debug", err)]
  pub fn open(prefix: &Path) -> Result<Self> {
    let name = prefix
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .ok_or_else(|| StoreError::invalid_input(format!("invalid prefix {}", prefix.display())))?;

    let path = [
      with_suffix(prefix, ".vcf.gz"),
      with_suffix(prefix, ".vcf"),
      prefix.to_path_buf(),
    ]
    .into_iter()
    .find(|path| path.is_file())
    .ok_or_else(|| StoreError::not_found(format!("no VCF found for prefix {}", prefix.display())))?;

    let spl = with_suffix(prefix, ".spl");
    let annotations = if spl.is_file() {
      Some(AnnotationDb::read(&spl)?)
    } else {
      None
    };

    debug!(path = %path.display(), "reading panel");
    let file =
      File::open(&path).map_err(|err| StoreError::IoError(format!("opening {}", path.display()), err))?;

    if path.extension().is_some_and(|ext| ext == "gz") {
      Self::from_reader(name, BufReader::new(bgzf::io::Reader::new(file)), annotations.as_ref())
    } else {
      Self::from_reader(name, BufReader::new(file), annotations.as_ref())
    }
  }

  /// Read a panel from VCF text.
  pub fn from_reader<R: BufRead>(
    name: impl Into<String>,
    reader: R,
    annotations: Option<&AnnotationDb>,
  ) -> Result<Self> {
    let name = name.into();
    let mut reader = vcf::io::Reader::new(reader);
    let header = reader
      .read_header()
      .map_err(|err| read_error(&name, err))?;

    let sample_names: Vec<String> = header.sample_names().iter().cloned().collect();
    let mut contigs: Vec<(String, Option<usize>)> = header
      .contigs()
      .iter()
      .map(|(contig, map)| (contig.to_string(), map.length()))
      .collect();

    let mut sites = Vec::new();
    for (number, record) in reader.record_bufs(&header).enumerate() {
      let record = record.map_err(|err| read_error(&format!("{name}: record {}", number + 1), err))?;
      let split = split_record(&record, sample_names.len())
        .map_err(|err| StoreError::parse_error(format!("{name}: record {}: {err}", number + 1)))?;

      for site in split {
        if !contigs.iter().any(|(contig, _)| *contig == site.contig) {
          contigs.push((site.contig.clone(), None));
        }
        sites.push(site);
      }
    }

    debug!(
      name,
      samples = sample_names.len(),
      sites = sites.len(),
      "loaded panel"
    );

    Ok(Self {
      name,
      samples: AnnotationDb::for_names(&sample_names, annotations),
      contigs,
      sites,
    })
  }

  /// Get the panel name.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Get the sample annotations, one row per sample.
  pub fn samples(&self) -> &AnnotationDb {
    &self.samples
  }

  /// Get the number of samples.
  pub fn sample_count(&self) -> usize {
    self.samples.len()
  }

  /// Get the contigs with their lengths, in header order.
  pub fn contigs(&self) -> &[(String, Option<usize>)] {
    &self.contigs
  }
}

fn read_error(context: &str, err: io::Error) -> StoreError {
  if err.kind() == io::ErrorKind::InvalidData {
    StoreError::parse_error(format!("{context}: {err}"))
  } else {
    StoreError::IoError(format!("reading {context}"), err)
  }
}

/// Split a record into one site per alternate allele.
fn split_record(record: &RecordBuf, n_samples: usize) -> std::result::Result<Vec<Site>, String> {
  let contig = record.reference_sequence_name();
  let position = record
    .variant_start()
    .map(|position| usize::from(position) as u64)
    .ok_or("missing position")?;
  let reference = record.reference_bases();

  let reference_length = match record.info().get(info_key::END_POSITION) {
    Some(Some(InfoValue::Integer(end))) => u64::try_from(*end)
      .map_err(|_| format!("invalid END `{end}`"))?
      .saturating_sub(position)
      + 1,
    Some(Some(value)) => return Err(format!("invalid END `{value:?}`")),
    _ => reference.len() as u64,
  };

  let genotypes: Vec<[Option<usize>; 2]> = record
    .samples()
    .values()
    .map(|sample| match sample.get(format_key::GENOTYPE) {
      Some(Some(SampleValue::Genotype(genotype))) => {
        let mut alleles = genotype.as_ref().iter().map(|allele| allele.position());
        [alleles.next().flatten(), alleles.next().flatten()]
      }
      _ => [None, None],
    })
    .chain(iter::repeat([None, None]))
    .take(n_samples)
    .collect();

  let sites = record
    .alternate_bases()
    .as_ref()
    .iter()
    .filter(|alt| *alt != ".")
    .enumerate()
    .map(|(index, alt)| {
      let allele = index + 1;
      let calls = genotypes.iter().flat_map(|&genotype| {
        genotype.map(|call| match call {
          None => Call::Missing,
          Some(0) => Call::Ref,
          Some(value) if value == allele => Call::Alt,
          Some(_) => Call::Other,
        })
      });

      Site {
        contig: contig.to_string(),
        position,
        reference_length,
        reference: reference.to_string(),
        alt: alt.clone(),
        planes: GenotypePlanes::from_calls(calls),
      }
    })
    .collect::<Vec<_>>();

  trace!(contig, position, sites = sites.len(), "split record");
  Ok(sites)
}
