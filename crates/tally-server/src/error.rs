//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// A version conflict or a write refused by the terminal-state policy.
  #[error("conflict: {0}")]
  Conflict(String),

  /// The store timed out or was locked; the request may be retried.
  #[error("unavailable: {0}")]
  Unavailable(String),

  #[error("internal error: {0}")]
  Internal(String),
}

impl From<tally_core::Error> for ApiError {
  fn from(err: tally_core::Error) -> Self {
    use tally_core::Error as E;
    let message = err.to_string();
    match err {
      E::MalformedPayload(_)
      | E::UnknownEntityType(_)
      | E::UnknownEventType(_)
      | E::UnknownActorType(_)
      | E::UnknownRawLogStatus(_) => Self::BadRequest(message),
      E::VersionConflict { .. } | E::TerminalState { .. } => Self::Conflict(message),
      E::Store { transient: true, .. } => Self::Unavailable(message),
      E::Store { .. } | E::Serialization(_) => Self::Internal(message),
    }
  }
}

impl From<tally_reconcile::Error> for ApiError {
  fn from(err: tally_reconcile::Error) -> Self {
    match err {
      tally_reconcile::Error::Ledger(e) => e.into(),
      e @ (tally_reconcile::Error::SequenceSpanTooLarge { .. }
      | tally_reconcile::Error::InvalidWindow { .. }) => Self::BadRequest(e.to_string()),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self {
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
