//! This module contains error and result types for bgt-axum.
//!

use std::{io, result};

use axum::response::{IntoResponse, Response};
use bgt_storage::StoreError;
use thiserror::Error;

/// The result type for bgt-axum.
pub type Result<T> = result::Result<T, Error>;

/// The error type for bgt-axum.
#[derive(Error, Debug)]
pub enum Error {
  #[error("{0}")]
  IoError(#[from] io::Error),

  #[error("server error: {0}")]
  ServerError(String),

  #[error("failed to open collection: {0}")]
  StoreError(#[from] StoreError),
}

impl From<Error> for io::Error {
  fn from(error: Error) -> Self {
    match error {
      Error::IoError(io) => io,
      Error::StoreError(err) => err.into(),
      error => io::Error::other(error),
    }
  }
}

/// A wrapper around the http `HttpError` for implementing Axum response traits.
#[derive(Debug)]
pub struct HttpError(pub bgt_http::HttpError);

impl IntoResponse for HttpError {
  fn into_response(self) -> Response {
    let (text, status_code) = self.0.to_text_representation();
    (status_code, text).into_response()
  }
}

impl From<bgt_http::HttpError> for HttpError {
  fn from(err: bgt_http::HttpError) -> Self {
    Self(err)
  }
}
