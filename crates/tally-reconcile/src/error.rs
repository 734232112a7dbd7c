//! Error types for `tally-reconcile`.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Ledger(#[from] tally_core::Error),

  /// The observed ID range is too wide to enumerate.
  #[error("sequence span of {span} ids exceeds the maximum of {max}")]
  SequenceSpanTooLarge { span: u64, max: u64 },

  #[error("invalid window: {start} is after {end}")]
  InvalidWindow {
    start: DateTime<Utc>,
    end:   DateTime<Utc>,
  },
}

impl Error {
  /// Store timeouts and lock contention are worth retrying.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::Ledger(e) if e.is_transient())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
