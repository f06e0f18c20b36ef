use reqwest::StatusCode;

use super::types::BillId;

/// Failure kinds surfaced by the bills/users REST client.
///
/// Status-based variants carry the `{error}` message from the response body
/// when the server sent one.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  #[error("request failed: {0}")]
  Network(#[from] reqwest::Error),

  #[error("not signed in{}", detail(.0))]
  Unauthorized(Option<String>),

  #[error("invalid request{}", detail(.0))]
  Validation(Option<String>),

  #[error("forbidden{}", detail(.0))]
  Forbidden(Option<String>),

  #[error("not found{}", detail(.0))]
  NotFound(Option<String>),

  #[error("server returned {status}{}", detail(.message))]
  Server {
    status: StatusCode,
    message: Option<String>,
  },

  #[error("could not decode response: {0}")]
  Decode(String),

  #[error("invalid endpoint url: {0}")]
  InvalidUrl(#[from] url::ParseError),

  #[error("bill {0} has not been saved yet")]
  TemporaryId(BillId),
}

fn detail(message: &Option<String>) -> String {
  message
    .as_deref()
    .map(|m| format!(": {}", m))
    .unwrap_or_default()
}

impl ApiError {
  /// Map an error status and its `{error}` payload (if any) to a typed error.
  pub fn from_status(status: StatusCode, message: Option<String>) -> Self {
    match status {
      StatusCode::UNAUTHORIZED => Self::Unauthorized(message),
      StatusCode::BAD_REQUEST => Self::Validation(message),
      StatusCode::FORBIDDEN => Self::Forbidden(message),
      StatusCode::NOT_FOUND => Self::NotFound(message),
      _ => Self::Server { status, message },
    }
  }

  /// The server-provided message, when the failure carried one.
  pub fn server_message(&self) -> Option<&str> {
    match self {
      Self::Unauthorized(m) | Self::Validation(m) | Self::Forbidden(m) | Self::NotFound(m) => {
        m.as_deref()
      }
      Self::Server { message, .. } => message.as_deref(),
      _ => None,
    }
  }

  /// Human-readable message, preferring the server's wording.
  pub fn user_message(&self, fallback: &str) -> String {
    self
      .server_message()
      .map(String::from)
      .unwrap_or_else(|| fallback.to_string())
  }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_mapping() {
    let err = ApiError::from_status(
      StatusCode::FORBIDDEN,
      Some("Only the bill owner can update this bill".into()),
    );
    assert!(matches!(err, ApiError::Forbidden(_)));
    assert_eq!(
      err.user_message("fallback"),
      "Only the bill owner can update this bill"
    );
    assert_eq!(
      err.to_string(),
      "forbidden: Only the bill owner can update this bill"
    );

    let err = ApiError::from_status(StatusCode::BAD_GATEWAY, None);
    assert!(matches!(err, ApiError::Server { .. }));
    assert_eq!(err.server_message(), None);
  }

  #[test]
  fn test_user_message_falls_back() {
    let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, None);
    assert_eq!(
      err.user_message("Failed to fetch bills"),
      "Failed to fetch bills"
    );

    let err = ApiError::Decode("eof".into());
    assert_eq!(
      err.user_message("Failed to fetch bills"),
      "Failed to fetch bills"
    );
  }
}
