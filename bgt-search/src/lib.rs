//! Executes structured queries against a [`Store`](bgt_storage::Store).
//!
//! The [`QueryExecutor`] applies a query to a fresh session and hands back an [`Execution`] that
//! streams the rendered response. Sample matching and haplotype counting observe the records of
//! the same scan.
//!

pub use bgt_config::types::{BgtError, Query, Result};
pub use executor::{Execution, Outcome, QueryExecutor};
pub use haplotype::HaplotypeCounter;
pub use listing::list_samples;
pub use resolver::{SampleResolver, spanning_region};

pub mod executor;
pub mod haplotype;
pub mod listing;
pub mod resolver;
