//! Flat metadata format (FMF) annotation databases.
//!
//! Each line holds one row: a name followed by tab-separated `key:type:value` fields, where the
//! type is `i` (integer), `f` (real) or anything else (text). A field without a type is a flag.
//!

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use noodles::bgzf;
use tracing::{debug, instrument};

use crate::error::{Result, StoreError};
use crate::expr::{Expr, Value};

/// A value attached to a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Meta {
  Flag,
  Int(i64),
  Real(f64),
  Str(String),
}

impl Meta {
  /// The value of this meta inside an expression. Flags are true.
  pub fn value(&self) -> Value {
    match self {
      Meta::Flag => Value::Num(1.0),
      Meta::Int(int) => Value::Num(*int as f64),
      Meta::Real(real) => Value::Num(*real),
      Meta::Str(s) => Value::Str(s.clone()),
    }
  }
}

/// A named row of an annotation database.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRow {
  name: String,
  metas: Vec<(usize, Meta)>,
}

impl AnnotationRow {
  /// Get the row name.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Get the meta for a key index.
  pub fn meta(&self, key: usize) -> Option<&Meta> {
    self
      .metas
      .iter()
      .find(|(index, _)| *index == key)
      .map(|(_, meta)| meta)
  }
}

/// An in-memory annotation database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationDb {
  keys: Vec<String>,
  rows: Vec<AnnotationRow>,
  names: HashMap<String, usize>,
}

impl AnnotationDb {
  /// Read a database from a file. Files ending in `.gz` are read as BGZF.
  #[instrument(level = "debug", err)]
  pub fn read(path: &Path) -> Result<Self> {
    let file = File::open(path)
      .map_err(|err| StoreError::IoError(format!("opening {}", path.display()), err))?;

    let db = if path.extension().is_some_and(|ext| ext == "gz") {
      Self::from_reader(BufReader::new(bgzf::io::Reader::new(file)))?
    } else {
      Self::from_reader(BufReader::new(file))?
    };

    debug!(rows = db.len(), keys = db.keys.len(), "read annotations");
    Ok(db)
  }

  /// Parse a database from a reader.
  pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
    let mut db = Self::default();

    for line in reader.lines() {
      let line = line.map_err(|err| StoreError::IoError("reading annotations".to_string(), err))?;
      if line.is_empty() || line.starts_with('#') {
        continue;
      }

      let mut fields = line.split('\t');
      let name = fields.next().unwrap_or_default();
      let metas = fields
        .filter(|field| !field.is_empty())
        .map(Self::parse_field)
        .collect::<Result<Vec<_>>>()?;

      db.push_row(name, metas);
    }

    Ok(db)
  }

  /// Build a database with one row per name, in order, copying annotations from `source` where
  /// a row with the same name exists there.
  pub fn for_names<S: AsRef<str>>(names: &[S], source: Option<&AnnotationDb>) -> Self {
    let mut db = Self::default();

    for name in names {
      let name = name.as_ref();
      let metas = source
        .and_then(|source| source.find(name).map(|row| (source, row)))
        .map(|(source, row)| {
          source.rows[row]
            .metas
            .iter()
            .map(|(key, meta)| (source.keys[*key].clone(), meta.clone()))
            .collect()
        })
        .unwrap_or_default();

      db.push_row(name, metas);
    }

    db
  }

  fn parse_field(field: &str) -> Result<(String, Meta)> {
    let Some((key, rest)) = field.split_once(':') else {
      return Ok((field.to_string(), Meta::Flag));
    };

    let meta = match rest.split_once(':') {
      Some(("i", value)) => Meta::Int(
        value
          .parse()
          .map_err(|_| StoreError::parse_error(format!("invalid integer in `{field}`")))?,
      ),
      Some(("f", value)) => Meta::Real(
        value
          .parse()
          .map_err(|_| StoreError::parse_error(format!("invalid real in `{field}`")))?,
      ),
      Some((_, value)) => Meta::Str(value.to_string()),
      None => Meta::Str(rest.to_string()),
    };

    Ok((key.to_string(), meta))
  }

  /// Append a row. Only the first row with a given name can be found by name.
  pub fn push_row(&mut self, name: impl Into<String>, metas: Vec<(String, Meta)>) {
    let name = name.into();
    let metas = metas
      .into_iter()
      .map(|(key, meta)| (self.key_index(key), meta))
      .collect();

    self.names.entry(name.clone()).or_insert(self.rows.len());
    self.rows.push(AnnotationRow { name, metas });
  }

  fn key_index(&mut self, key: String) -> usize {
    match self.keys.iter().position(|existing| *existing == key) {
      Some(index) => index,
      None => {
        self.keys.push(key);
        self.keys.len() - 1
      }
    }
  }

  /// Get the keys in first-seen order.
  pub fn keys(&self) -> &[String] {
    &self.keys
  }

  /// Get the rows.
  pub fn rows(&self) -> &[AnnotationRow] {
    &self.rows
  }

  /// Get a row.
  pub fn row(&self, row: usize) -> Option<&AnnotationRow> {
    self.rows.get(row)
  }

  /// Get the number of rows.
  pub fn len(&self) -> usize {
    self.rows.len()
  }

  /// Whether the database has no rows.
  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  /// Find a row by name.
  pub fn find(&self, name: &str) -> Option<usize> {
    self.names.get(name).copied()
  }

  /// Get the value of a key in a row.
  pub fn value(&self, row: usize, key: &str) -> Option<Value> {
    let key = self.keys.iter().position(|existing| existing == key)?;
    self.rows.get(row)?.meta(key).map(Meta::value)
  }

  /// Test a row against an expression.
  pub fn test(&self, row: usize, expr: &Expr) -> bool {
    expr.test(&|key: &str| self.value(row, key))
  }
}
