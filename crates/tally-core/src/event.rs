//! Event records, the atomic, immutable unit of the ledger.
//!
//! One [`EventRecord`] is one state transition of one entity. Records are
//! appended and never updated; the current state of an entity is always the
//! `data_after` of its highest version.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{
  Error, Result,
  entity::{EntityKey, EntityType},
  payload::Payload,
};

// ─── Enums ───────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
  Created,
  Updated,
  Cancelled,
  Deleted,
  Restored,
  Amended,
  Voided,
  Reconciled,
}

impl EventType {
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownEventType(s.to_owned()))
  }

  /// Business logic treats an entity whose latest event is one of these as
  /// finished. The ledger only enforces this under
  /// [`TerminalPolicy::Reject`](crate::config::TerminalPolicy::Reject).
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Cancelled | Self::Deleted | Self::Voided)
  }

  /// Events that may always follow a terminal event.
  pub fn reopens(self) -> bool { matches!(self, Self::Restored | Self::Reconciled) }
}

/// Who or what caused a change.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActorType {
  #[default]
  System,
  User,
  Api,
  Reconciliation,
}

impl ActorType {
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownActorType(s.to_owned()))
  }
}

// ─── EventRecord ─────────────────────────────────────────────────────────────

/// A persisted ledger row. No field is ever modified after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
  pub event_id:         String,
  pub entity_type:      EntityType,
  pub entity_id:        String,
  pub event_type:       EventType,
  /// Ledger-write time (system clock, UTC).
  pub event_timestamp:  DateTime<Utc>,
  /// When the upstream system says the change happened.
  pub source_timestamp: Option<DateTime<Utc>>,
  /// Starts at 1 and increases by one per entity.
  pub version:          u64,
  /// Prior snapshot; populated by the ledger for `updated` events.
  pub data_before:      Option<Payload>,
  pub data_after:       Payload,
  pub data_fingerprint: String,
  pub source_system:    String,
  pub changed_fields:   Vec<String>,
  pub change_reason:    Option<String>,
  pub actor_type:       ActorType,
  pub actor_id:         Option<String>,
  /// The raw intake log this event was produced from, if any.
  pub raw_log_id:       Option<Uuid>,
}

impl EventRecord {
  pub fn key(&self) -> EntityKey {
    EntityKey::new(self.entity_type, self.entity_id.clone())
  }

  /// Event IDs are derived, not random: two events only collide when the
  /// same entity is written twice within one microsecond.
  pub fn derive_id(
    entity_type: EntityType,
    entity_id: &str,
    at: DateTime<Utc>,
  ) -> String {
    format!("{entity_type}:{entity_id}:{}", at.timestamp_micros())
  }
}

// ─── NewEvent ────────────────────────────────────────────────────────────────

/// Input to [`crate::ledger::Ledger::log_event`]. Versioning, fingerprinting
/// and timestamps are assigned by the ledger.
#[derive(Debug, Clone)]
pub struct NewEvent {
  pub entity_type:      EntityType,
  pub entity_id:        String,
  pub event_type:       EventType,
  pub data_after:       Payload,
  pub source_system:    String,
  pub data_before:      Option<Payload>,
  pub source_timestamp: Option<DateTime<Utc>>,
  pub change_reason:    Option<String>,
  pub actor_type:       ActorType,
  pub actor_id:         Option<String>,
  /// Write exactly this version instead of `latest + 1`. Fails with a
  /// version conflict if the version is already taken.
  pub force_version:    Option<u64>,
  pub raw_log_id:       Option<Uuid>,
}

impl NewEvent {
  /// Convenience constructor with all optional fields unset.
  pub fn new(
    entity_type: EntityType,
    entity_id: impl Into<String>,
    event_type: EventType,
    data_after: Payload,
    source_system: impl Into<String>,
  ) -> Self {
    Self {
      entity_type,
      entity_id: entity_id.into(),
      event_type,
      data_after,
      source_system: source_system.into(),
      data_before: None,
      source_timestamp: None,
      change_reason: None,
      actor_type: ActorType::default(),
      actor_id: None,
      force_version: None,
      raw_log_id: None,
    }
  }

  pub fn key(&self) -> EntityKey {
    EntityKey::new(self.entity_type, self.entity_id.clone())
  }
}

// ─── LatestVersion ───────────────────────────────────────────────────────────

/// The head of an entity's stream: `(0, None, None)` if it has no events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatestVersion {
  pub version:     u64,
  pub data:        Option<Payload>,
  pub fingerprint: Option<String>,
  pub event_type:  Option<EventType>,
}

impl From<Option<EventRecord>> for LatestVersion {
  fn from(record: Option<EventRecord>) -> Self {
    match record {
      Some(r) => Self {
        version:     r.version,
        data:        Some(r.data_after),
        fingerprint: Some(r.data_fingerprint),
        event_type:  Some(r.event_type),
      },
      None => Self::default(),
    }
  }
}
