//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings so that textual
//! comparison in SQL matches temporal order. Payloads and field lists are
//! compact JSON. UUIDs are hyphenated lowercase strings.

use chrono::{DateTime, Utc};
use tally_core::{
  entity::EntityType,
  event::{ActorType, EventRecord, EventType},
  intake::{RawLog, RawLogStatus},
  payload::{Payload, encode_stamp},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { encode_stamp(dt) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// The `event_date` partition value.
pub fn encode_date(dt: DateTime<Utc>) -> String { dt.format("%Y-%m-%d").to_string() }

// ─── Payloads ─────────────────────────────────────────────────────────────────

pub fn encode_payload(p: &Payload) -> Result<String> { Ok(serde_json::to_string(p)?) }

pub fn decode_payload(s: &str) -> Result<Payload> { Ok(serde_json::from_str(s)?) }

pub fn encode_fields(fields: &[String]) -> Result<String> {
  Ok(serde_json::to_string(fields)?)
}

pub fn decode_fields(s: &str) -> Result<Vec<String>> { Ok(serde_json::from_str(s)?) }

// ─── Identifiers ──────────────────────────────────────────────────────────────

/// Accept only `[A-Za-z_][A-Za-z0-9_]*` so a table name can be interpolated
/// into SQL.
pub fn checked_identifier(name: &str) -> Result<&str> {
  let mut chars = name.chars();
  let valid = chars
    .next()
    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
  if valid { Ok(name) } else { Err(Error::InvalidIdentifier(name.to_owned())) }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawEvent::from_row`].
pub const EVENT_COLUMNS: &str = "event_id, entity_type, entity_id, event_type, event_timestamp,
   source_timestamp, version, data_before, data_after, data_fingerprint,
   source_system, changed_fields, change_reason, actor_type, actor_id, raw_log_id";

/// Raw strings read directly from a `ledger_events` row.
pub struct RawEvent {
  pub event_id:         String,
  pub entity_type:      String,
  pub entity_id:        String,
  pub event_type:       String,
  pub event_timestamp:  String,
  pub source_timestamp: Option<String>,
  pub version:          i64,
  pub data_before:      Option<String>,
  pub data_after:       String,
  pub data_fingerprint: String,
  pub source_system:    String,
  pub changed_fields:   String,
  pub change_reason:    Option<String>,
  pub actor_type:       String,
  pub actor_id:         Option<String>,
  pub raw_log_id:       Option<String>,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:         row.get(0)?,
      entity_type:      row.get(1)?,
      entity_id:        row.get(2)?,
      event_type:       row.get(3)?,
      event_timestamp:  row.get(4)?,
      source_timestamp: row.get(5)?,
      version:          row.get(6)?,
      data_before:      row.get(7)?,
      data_after:       row.get(8)?,
      data_fingerprint: row.get(9)?,
      source_system:    row.get(10)?,
      changed_fields:   row.get(11)?,
      change_reason:    row.get(12)?,
      actor_type:       row.get(13)?,
      actor_id:         row.get(14)?,
      raw_log_id:       row.get(15)?,
    })
  }

  pub fn into_record(self) -> Result<EventRecord> {
    Ok(EventRecord {
      event_id:         self.event_id,
      entity_type:      EntityType::parse(&self.entity_type)?,
      entity_id:        self.entity_id,
      event_type:       EventType::parse(&self.event_type)?,
      event_timestamp:  decode_dt(&self.event_timestamp)?,
      source_timestamp: self.source_timestamp.as_deref().map(decode_dt).transpose()?,
      version:          self.version as u64,
      data_before:      self.data_before.as_deref().map(decode_payload).transpose()?,
      data_after:       decode_payload(&self.data_after)?,
      data_fingerprint: self.data_fingerprint,
      source_system:    self.source_system,
      changed_fields:   decode_fields(&self.changed_fields)?,
      change_reason:    self.change_reason,
      actor_type:       ActorType::parse(&self.actor_type)?,
      actor_id:         self.actor_id,
      raw_log_id:       self.raw_log_id.as_deref().map(decode_uuid).transpose()?,
    })
  }
}

/// Column list matching [`RawIntake::from_row`].
pub const RAW_LOG_COLUMNS: &str =
  "log_id, source_type, received_at, status, target_schema, payload_json";

/// Raw strings read directly from a `raw_intake_log` row.
pub struct RawIntake {
  pub log_id:        String,
  pub source_type:   String,
  pub received_at:   String,
  pub status:        String,
  pub target_schema: Option<String>,
  pub payload_json:  Option<String>,
}

impl RawIntake {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      log_id:        row.get(0)?,
      source_type:   row.get(1)?,
      received_at:   row.get(2)?,
      status:        row.get(3)?,
      target_schema: row.get(4)?,
      payload_json:  row.get(5)?,
    })
  }

  pub fn into_raw_log(self) -> Result<RawLog> {
    Ok(RawLog {
      log_id:        decode_uuid(&self.log_id)?,
      source_type:   self.source_type,
      received_at:   decode_dt(&self.received_at)?,
      status:        RawLogStatus::parse(&self.status)?,
      target_schema: self.target_schema,
      payload:       self
        .payload_json
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()?,
    })
  }
}
