use http::StatusCode;
use thiserror::Error;

use bgt_config::types::BgtError;

pub type Result<T> = core::result::Result<T, HttpError>;

/// Errors returned to clients, each with its own status code.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HttpError {
  #[error("InvalidInput")]
  InvalidInput(String),
  #[error("PermissionDenied")]
  PermissionDenied(String),
  #[error("NotFound")]
  NotFound(String),
  #[error("InternalError")]
  InternalError(String),
}

impl HttpError {
  /// Get the status code and the plain text body of this error. The body is the status line
  /// followed by the message, e.g. `400 Bad Request: failed to parse parameter 'f'`.
  pub fn to_text_representation(&self) -> (String, StatusCode) {
    let (message, status_code) = match self {
      HttpError::InvalidInput(message) => (message, StatusCode::BAD_REQUEST),
      HttpError::PermissionDenied(message) => (message, StatusCode::FORBIDDEN),
      HttpError::NotFound(message) => (message, StatusCode::NOT_FOUND),
      HttpError::InternalError(message) => (message, StatusCode::INTERNAL_SERVER_ERROR),
    };

    (
      format!(
        "{} {}: {message}",
        status_code.as_u16(),
        status_code.canonical_reason().unwrap_or_default()
      ),
      status_code,
    )
  }
}

impl From<BgtError> for HttpError {
  fn from(error: BgtError) -> Self {
    match error {
      BgtError::InvalidInput(err) => Self::InvalidInput(err),
      BgtError::PermissionDenied(err) => Self::PermissionDenied(err),
      BgtError::NotFound(err) => Self::NotFound(err),
      BgtError::IoError(err) | BgtError::ParseError(err) | BgtError::InternalError(err) => {
        Self::InternalError(err)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn invalid_input_text() {
    assert_eq!(
      HttpError::InvalidInput("failed to parse parameter 'f'".to_string()).to_text_representation(),
      (
        "400 Bad Request: failed to parse parameter 'f'".to_string(),
        StatusCode::BAD_REQUEST
      )
    );
  }

  #[test]
  fn permission_denied_text() {
    let (body, status) = HttpError::PermissionDenied("small groups".to_string()).to_text_representation();

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "403 Forbidden: small groups");
  }

  #[test]
  fn from_bgt_error() {
    assert_eq!(
      HttpError::from(BgtError::invalid_input("region")),
      HttpError::InvalidInput("region".to_string())
    );
    assert_eq!(
      HttpError::from(BgtError::io_error("disk")),
      HttpError::InternalError("disk".to_string())
    );
  }
}
