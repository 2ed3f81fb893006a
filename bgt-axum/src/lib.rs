//! An Axum server answering BGT queries over HTTP.
//!

pub mod error;
pub mod handlers;
pub mod server;
