//! Error and result types for bgt-storage.
//!

use std::io;
use std::io::ErrorKind;

use bgt_config::types::BgtError;
use thiserror::Error;

use crate::expr::ExprError;

/// The result type for storage.
pub type Result<T> = core::result::Result<T, StoreError>;

/// Storage error type.
#[derive(Error, Debug)]
pub enum StoreError {
  #[error("`{0}`: `{1}`")]
  IoError(String, io::Error),

  #[error("`{0}`")]
  InvalidInput(String),

  #[error("not found: `{0}`")]
  NotFound(String),

  #[error("failed to parse: `{0}`")]
  ParseError(String),

  #[error("internal error: `{0}`")]
  InternalError(String),
}

impl StoreError {
  /// Create an `InvalidInput` error.
  pub fn invalid_input<S: Into<String>>(message: S) -> Self {
    Self::InvalidInput(message.into())
  }

  /// Create a `NotFound` error.
  pub fn not_found<S: Into<String>>(message: S) -> Self {
    Self::NotFound(message.into())
  }

  /// Create a `ParseError` error.
  pub fn parse_error<S: Into<String>>(message: S) -> Self {
    Self::ParseError(message.into())
  }

  /// Create an `InternalError` error.
  pub fn internal_error<S: Into<String>>(message: S) -> Self {
    Self::InternalError(message.into())
  }
}

impl From<ExprError> for StoreError {
  fn from(err: ExprError) -> Self {
    Self::InvalidInput(err.to_string())
  }
}

impl From<BgtError> for StoreError {
  fn from(err: BgtError) -> Self {
    match err {
      BgtError::InvalidInput(message) => Self::InvalidInput(message),
      BgtError::NotFound(message) => Self::NotFound(message),
      BgtError::ParseError(message) => Self::ParseError(message),
      err => Self::InternalError(err.to_string()),
    }
  }
}

impl From<StoreError> for BgtError {
  fn from(err: StoreError) -> Self {
    match err {
      err @ StoreError::InvalidInput(_) => Self::InvalidInput(err.to_string()),
      err @ StoreError::NotFound(_) => Self::NotFound(err.to_string()),
      err @ StoreError::IoError(_, _) => Self::IoError(err.to_string()),
      err @ StoreError::ParseError(_) => Self::ParseError(err.to_string()),
      err @ StoreError::InternalError(_) => Self::InternalError(err.to_string()),
    }
  }
}

impl From<StoreError> for io::Error {
  fn from(err: StoreError) -> Self {
    match err {
      StoreError::IoError(_, ref io_error) => Self::new(io_error.kind(), err),
      err => Self::new(ErrorKind::Other, err),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn store_error_invalid_input() {
    let result = BgtError::from(StoreError::invalid_input("error"));
    assert!(matches!(result, BgtError::InvalidInput(message) if message == "`error`"));
  }

  #[test]
  fn store_error_not_found() {
    let result = BgtError::from(StoreError::not_found("panel"));
    assert!(matches!(result, BgtError::NotFound(_)));
  }

  #[test]
  fn store_error_io_error() {
    let result = BgtError::from(StoreError::IoError(
      "error".to_string(),
      io::Error::new(ErrorKind::NotFound, "io error"),
    ));
    assert!(matches!(result, BgtError::IoError(_)));
  }

  #[test]
  fn store_error_internal_error() {
    let result = BgtError::from(StoreError::internal_error("error"));
    assert!(matches!(result, BgtError::InternalError(_)));
  }

  #[test]
  fn io_error_keeps_kind() {
    let result = io::Error::from(StoreError::IoError(
      "error".to_string(),
      io::Error::new(ErrorKind::NotFound, "io error"),
    ));
    assert_eq!(result.kind(), ErrorKind::NotFound);
  }
}
