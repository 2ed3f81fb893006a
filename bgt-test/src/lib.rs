pub use bgt_config::config::Config;

#[cfg(feature = "http")]
pub mod http;
pub mod util;
