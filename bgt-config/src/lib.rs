pub use clap::command;

pub mod config;
pub mod error;
pub mod types;
