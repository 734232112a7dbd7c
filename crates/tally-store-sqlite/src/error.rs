//! Error type for `tally-store-sqlite`.

use std::time::Duration;

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tally_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("query timed out after {0:?}")]
  Timeout(Duration),

  /// Table names are interpolated into SQL, so only plain identifiers pass.
  #[error("invalid table name: {0:?}")]
  InvalidIdentifier(String),
}

impl tally_core::store::StoreError for Error {
  fn is_transient(&self) -> bool {
    match self {
      Error::Timeout(_) => true,
      Error::Database(tokio_rusqlite::Error::Rusqlite(
        rusqlite::Error::SqliteFailure(e, _),
      )) => matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked),
      _ => false,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
