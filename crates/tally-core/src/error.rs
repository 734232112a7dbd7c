//! Error types for `tally-core`.

use thiserror::Error;

use crate::{entity::EntityKey, event::EventType, store::StoreError};

#[derive(Debug, Error)]
pub enum Error {
  #[error("malformed payload: {0}")]
  MalformedPayload(String),

  #[error("unknown entity type: {0:?}")]
  UnknownEntityType(String),

  #[error("unknown event type: {0:?}")]
  UnknownEventType(String),

  #[error("unknown actor type: {0:?}")]
  UnknownActorType(String),

  #[error("unknown raw log status: {0:?}")]
  UnknownRawLogStatus(String),

  #[error("version conflict on {entity}: version {attempted} is already taken")]
  VersionConflict { entity: EntityKey, attempted: u64 },

  #[error("{entity} is {state}; refusing {attempted} event")]
  TerminalState {
    entity:    EntityKey,
    state:     EventType,
    attempted: EventType,
  },

  /// The backing store failed. `transient` errors (timeouts, lock
  /// contention) may succeed on retry.
  #[error("store error: {source}")]
  Store {
    transient: bool,
    #[source]
    source:    Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Wrap a backend error, keeping its transient classification.
  pub fn store<E: StoreError>(err: E) -> Self {
    Self::Store { transient: err.is_transient(), source: Box::new(err) }
  }

  pub fn is_transient(&self) -> bool {
    matches!(self, Self::Store { transient: true, .. })
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
