//! Classification of incoming upstream data into ledger event types.
//!
//! This is the only state machine in the write path. Each call makes one
//! transition chosen from the caller's [`Intent`] and whether the entity
//! already has a version; there are no multi-step transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  entity::EntityType,
  event::EventType,
  payload::{self, Payload},
};

/// What the upstream collaborator says happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
  /// A normal write: create or update.
  #[default]
  Write,
  Cancel,
  Delete,
}

impl Intent {
  /// Cancellation wins over deletion when both flags are set.
  pub fn from_flags(is_cancellation: bool, is_deletion: bool) -> Self {
    match (is_cancellation, is_deletion) {
      (true, _) => Self::Cancel,
      (false, true) => Self::Delete,
      (false, false) => Self::Write,
    }
  }
}

/// The transition chosen for one incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
  Create,
  Update,
  Cancel,
  Delete,
}

impl Classification {
  pub fn classify(intent: Intent, current_version: u64) -> Self {
    match (intent, current_version) {
      (Intent::Cancel, _) => Self::Cancel,
      (Intent::Delete, _) => Self::Delete,
      (Intent::Write, 0) => Self::Create,
      (Intent::Write, _) => Self::Update,
    }
  }

  pub fn event_type(self) -> EventType {
    match self {
      Self::Create => EventType::Created,
      Self::Update => EventType::Updated,
      Self::Cancel => EventType::Cancelled,
      Self::Delete => EventType::Deleted,
    }
  }

  /// Write the status markers for this transition into `data`.
  pub fn stamp(self, data: &mut Payload, now: DateTime<Utc>) {
    match self {
      Self::Create => data.insert(payload::STATUS, "active"),
      Self::Update => {}
      Self::Cancel => {
        data.insert(payload::STATUS, "cancelled");
        data.stamp_time(payload::CANCELLED_AT, now);
      }
      Self::Delete => {
        data.insert(payload::STATUS, "deleted");
        data.stamp_time(payload::DELETED_AT, now);
      }
    }
  }
}

/// An incoming update is stale when the latest snapshot was applied at a
/// source timestamp at or after the incoming one. Without either timestamp
/// there is nothing to compare and the write proceeds.
pub fn is_stale(incoming: Option<DateTime<Utc>>, latest: Option<&Payload>) -> bool {
  match (incoming, latest.and_then(Payload::source_timestamp)) {
    (Some(incoming), Some(applied)) => payload::truncate_stamp(incoming) <= applied,
    _ => false,
  }
}

/// A normalised upstream record handed to
/// [`Ledger::process_incoming_data`](crate::ledger::Ledger::process_incoming_data).
#[derive(Debug, Clone)]
pub struct IncomingData {
  pub entity_type:      EntityType,
  pub entity_id:        String,
  pub data:             Payload,
  pub source_system:    String,
  pub source_timestamp: Option<DateTime<Utc>>,
  pub intent:           Intent,
  pub raw_log_id:       Option<Uuid>,
}

impl IncomingData {
  pub fn new(
    entity_type: EntityType,
    entity_id: impl Into<String>,
    data: Payload,
    source_system: impl Into<String>,
  ) -> Self {
    Self {
      entity_type,
      entity_id: entity_id.into(),
      data,
      source_system: source_system.into(),
      source_timestamp: None,
      intent: Intent::default(),
      raw_log_id: None,
    }
  }

  pub fn at(mut self, source_timestamp: DateTime<Utc>) -> Self {
    self.source_timestamp = Some(source_timestamp);
    self
  }

  pub fn with_intent(mut self, intent: Intent) -> Self {
    self.intent = intent;
    self
  }
}
