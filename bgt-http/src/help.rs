//! The plain text page returned for a request without parameters.
//!

use std::fmt::Write;

use bgt_config::config::limits::Limits;
use bgt_storage::Store;
use bgt_storage::fmf::AnnotationDb;

const DEFAULT_HOST: &str = "localhost";

const PARAMETERS: &str = "\
Accepted Parameters
===================

Sample selection:

  s EXPR  A sample group: either a comma-led list of names (s=,sample1,sample2) or an expression
          over sample annotations (s=population==\"FIN\"). Repeat 's' to define up to 8 groups,
          numbered from 1 in the order given.

  q EXPR  Without 'a', list the samples matching an expression over sample annotations.

Site selection:

  r STR   Region, e.g. 11:200,000-300,000
  i INT   Start from the INT-th record, counted from 1
  n INT   Read at most INT records
  a EXPR  Alleles: a comma-led list of chr:1basedPos:refLen:alleleSeq, or an expression over the
          variant annotations. An allele with an empty sequence stands for the reference state.
  f EXPR  Filter on allele counts: AC, AN, AC# and AN# for the #-th sample group.

VCF output:

  G       Don't output sample genotypes
  g       Output sample genotypes, overriding G
  C       Output AC and AN in INFO. Implied by 's'.

Other output:

  S       List the samples carrying every allele of 'a', or every sample without 'a'
  H       Count haplotypes over the alleles of 'a'
  t STR   Comma-separated table columns: CHROM, POS, END, REF, ALT, AC, AN, AC#, AN#

Use .and. and .or. for the && and || operators. A response ending in a line with a single '*'
was truncated.
";

fn keys(db: Option<&AnnotationDb>) -> String {
  match db {
    Some(db) if !db.keys().is_empty() => db.keys().join(", "),
    _ => "(none)".to_string(),
  }
}

/// Render the help page, describing the collection served and using `host` in the examples.
pub fn help_page(store: &impl Store, limits: Limits, host: Option<&str>) -> String {
  let host = host.unwrap_or(DEFAULT_HOST);
  let mut page = String::new();

  page.push_str("Server Configuration\n====================\n\n");
  page.push_str(" * BGT files and their queryable sample annotations:\n");
  for file in 0..store.file_count() {
    let _ = writeln!(
      page,
      "   - {}: {}",
      store.file_name(file).unwrap_or_default(),
      keys(store.sample_annotations(file))
    );
  }
  page.push('\n');

  match store.variant_annotations() {
    Some(db) => {
      let _ = writeln!(page, " * Queryable variant annotations: {}\n", keys(Some(db)));
    }
    None => page.push_str(" * No variant annotations specified.\n\n"),
  }

  if limits.genotypes_allowed() {
    page.push_str(" * Individual genotypes may be reported.\n\n");
  } else {
    let _ = writeln!(
      page,
      " * Genotypes are never reported and sample groups need at least {} samples.\n",
      limits.min_group_size()
    );
  }
  let _ = writeln!(
    page,
    " * Genotypes processed per query: at most {}\n",
    limits.max_genotypes()
  );

  page.push_str("Example Queries\n===============\n\n");
  page.push_str(" * Variants present in both the FIN and the CEU populations:\n\n");
  let _ = writeln!(
    page,
    "   curl -s 'http://{host}/?s=(population==\"FIN\")&s=(population==\"CEU\")&f=(AC1>0.and.AC2>0)'\n"
  );
  if store.variant_annotations().is_some() {
    page.push_str(" * HIGH impact variants in the FIN population:\n\n");
    let _ = writeln!(
      page,
      "   curl -s 'http://{host}/?a=(impact==\"HIGH\")&s=(population==\"FIN\")&f=(AC>0)'\n"
    );
  }
  page.push_str(" * A table of called sites in a region:\n\n");
  let _ = writeln!(
    page,
    "   curl -s 'http://{host}/?t=CHROM,POS,END,REF,ALT,AC,AN&f=(AN>0)&r=11:200,000-300,000'\n"
  );
  page.push_str(" * FIN samples carrying three alleles:\n\n");
  let _ = writeln!(
    page,
    "   curl -s 'http://{host}/?a=,11:151344:1:G,11:110992:AACTT:A,11:160513::G&S&s=(population==\"FIN\")'\n"
  );

  page.push_str(PARAMETERS);
  page
}

#[cfg(test)]
mod tests {
  use bgt_storage::memory::MemoryStore;
  use bgt_test::util::{test_panels, test_store};

  use super::*;

  #[test]
  fn describes_collection() {
    let page = help_page(&test_store(), Limits::default(), Some("example.org:8000"));

    assert!(page.starts_with("Server Configuration\n"));
    assert!(page.contains("   - panel1: population, gender\n"));
    assert!(page.contains(" * Queryable variant annotations: gene, impact\n"));
    assert!(page.contains("at most 10000000\n"));
    assert!(page.contains("curl -s 'http://example.org:8000/?a=(impact==\"HIGH\")"));
    assert!(page.contains("Accepted Parameters\n"));
  }

  #[test]
  fn without_variant_annotations() {
    let store = MemoryStore::new(test_panels(), None);
    let page = help_page(&store, Limits::default().with_min_group_size(5), None);

    assert!(page.contains(" * No variant annotations specified.\n"));
    assert!(page.contains("at least 5 samples"));
    assert!(page.contains("http://localhost/?s="));
    assert!(!page.contains("impact==\"HIGH\""));
  }
}
