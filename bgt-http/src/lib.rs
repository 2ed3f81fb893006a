//! Framework independent HTTP handling: translates request parameters into a query and runs it.
//!

use bgt_config::config::limits::Limits;
use bgt_config::types::{Params, Query};

pub use bgt_config::types::Request;
pub use bgt_search::executor::TRUNCATION_MARKER;
pub use bgt_search::QueryExecutor;
pub use error::{HttpError, Result};
pub use escape::{escape, parse_params, unescape};
pub use help::help_page;
pub use http_core::{QueryResponse, query};
use query_builder::QueryBuilder;

mod error;
mod escape;
mod help;
mod http_core;
mod query_builder;

/// Translate parameters into a query. Flags are read first, then each parameter in turn, so the
/// first invalid parameter decides the error.
fn convert_to_query(params: &Params, limits: Limits) -> Result<Query> {
  Ok(
    QueryBuilder::new(limits)
      .with_flags(params)
      .with_site_filter(params.get("f"))
      .with_region(params.get("r"))?
      .with_start(params.get("i"))?
      .with_max_records(params.get("n"))?
      .with_table(params.get("t"))?
      .with_alleles(params.get("a"))?
      .with_groups(params.get_all("s"))?
      .with_sample_filter(params.get("q"))
      .build(),
  )
}

#[cfg(test)]
mod tests {
  use bgt_config::types::{AlleleSelection, AlleleSpec, Region, SampleGroup};

  use super::*;

  #[test]
  fn convert_full_query() {
    let params = parse_params(
      "s=(population==%22FIN%22)&s=,Y&f=(AC1>0&&AC2>0)&r=11:100-300&i=2&n=5&a=,11:250:1:A&H",
    );
    let query = convert_to_query(&params, Limits::default()).unwrap();

    assert!(query.flags().genotypes());
    assert!(query.flags().allele_counts());
    assert!(query.flags().haplotype_counts());
    assert_eq!(query.site_filter(), Some("(AC1>0&&AC2>0)"));
    assert_eq!(query.region(), Some(&Region::new("11", Some(100), Some(300))));
    assert_eq!(query.start(), Some(2));
    assert_eq!(query.max_records(), Some(5));
    assert_eq!(
      query.alleles(),
      Some(&AlleleSelection::List(vec![AlleleSpec::new("11", 250, 1, "A")]))
    );
    assert_eq!(
      query.groups(),
      [
        SampleGroup::Expression("(population==\"FIN\")".to_string()),
        SampleGroup::List(vec!["Y".to_string()])
      ]
    );
  }

  #[test]
  fn first_invalid_parameter_wins() {
    let params = parse_params("r=11:x&i=0");

    assert!(matches!(
      convert_to_query(&params, Limits::default()),
      Err(HttpError::InvalidInput(message)) if message.contains("'r'")
    ));
  }
}
