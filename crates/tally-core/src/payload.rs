//! Entity snapshots, canonical fingerprints and field-level diffs.
//!
//! A [`Payload`] is a full snapshot of an entity (never a delta). Keys that
//! start with `_` are ledger bookkeeping stamped by the write path; they are
//! part of the stored snapshot and its fingerprint, but never count as a
//! business-level change.

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

pub const META_PREFIX: char = '_';

pub const STATUS: &str = "_status";
pub const SOURCE_TIMESTAMP: &str = "_source_timestamp";
pub const CANCELLED_AT: &str = "_cancelled_at";
pub const DELETED_AT: &str = "_deleted_at";
pub const RESTORED_AT: &str = "_restored_at";
pub const VOIDED_AT: &str = "_voided_at";

// ─── Payload ─────────────────────────────────────────────────────────────────

/// A JSON object holding one snapshot of an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Payload(Map<String, Value>);

impl Payload {
  pub fn new() -> Self { Self::default() }

  /// Accept any JSON object; anything else is a malformed payload.
  pub fn from_value(value: Value) -> Result<Self> {
    match value {
      Value::Object(map) => Ok(Self(map)),
      other => Err(Error::MalformedPayload(format!(
        "expected a JSON object, got {}",
        json_kind(&other)
      ))),
    }
  }

  pub fn get(&self, key: &str) -> Option<&Value> { self.0.get(key) }

  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
    self.0.insert(key.into(), value.into());
  }

  pub fn remove(&mut self, key: &str) -> Option<Value> { self.0.remove(key) }

  pub fn as_map(&self) -> &Map<String, Value> { &self.0 }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  /// Stamp a bookkeeping timestamp in the same format the ledger stores.
  pub fn stamp_time(&mut self, key: &str, at: DateTime<Utc>) {
    self.insert(key, encode_stamp(at));
  }

  /// The `_status` marker, if any.
  pub fn status(&self) -> Option<&str> {
    self.get(STATUS).and_then(Value::as_str)
  }

  /// The upstream timestamp this snapshot was last applied at. Values that
  /// do not parse as RFC 3339 are treated as absent.
  pub fn source_timestamp(&self) -> Option<DateTime<Utc>> {
    self
      .get(SOURCE_TIMESTAMP)
      .and_then(Value::as_str)
      .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
      .map(|dt| dt.with_timezone(&Utc))
  }

  /// Content hash of the snapshot. Key order never affects the result, at
  /// any nesting depth.
  pub fn fingerprint(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(&Value::Object(self.0.clone())).as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Business fields whose normalised JSON differs between `previous` and
  /// `self`, sorted by name. Bookkeeping keys are ignored; a field present
  /// on only one side counts as changed.
  pub fn changed_fields(&self, previous: &Payload) -> Vec<String> {
    let keys: BTreeSet<&String> = self
      .0
      .keys()
      .chain(previous.0.keys())
      .filter(|k| !k.starts_with(META_PREFIX))
      .collect();

    keys
      .into_iter()
      .filter(|k| {
        self.0.get(*k).map(canonical_json) != previous.0.get(*k).map(canonical_json)
      })
      .cloned()
      .collect()
  }
}

impl TryFrom<Value> for Payload {
  type Error = Error;

  fn try_from(value: Value) -> Result<Self> { Self::from_value(value) }
}

impl From<Payload> for Value {
  fn from(payload: Payload) -> Self { Value::Object(payload.0) }
}

impl From<Map<String, Value>> for Payload {
  fn from(map: Map<String, Value>) -> Self { Self(map) }
}

// ─── Canonical form ──────────────────────────────────────────────────────────

/// Serialise `value` with object keys sorted at every depth.
///
/// Independent of whether `serde_json` was built with `preserve_order`.
pub fn canonical_json(value: &Value) -> String {
  let mut out = String::new();
  write_canonical(value, &mut out);
  out
}

fn write_canonical(value: &Value, out: &mut String) {
  match value {
    Value::Object(map) => {
      let mut entries: Vec<(&String, &Value)> = map.iter().collect();
      entries.sort_by(|a, b| a.0.cmp(b.0));
      out.push('{');
      for (i, (k, v)) in entries.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        out.push_str(&Value::String(k.clone()).to_string());
        out.push(':');
        write_canonical(v, out);
      }
      out.push('}');
    }
    Value::Array(items) => {
      out.push('[');
      for (i, v) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(v, out);
      }
      out.push(']');
    }
    scalar => out.push_str(&scalar.to_string()),
  }
}

/// Drop sub-microsecond precision. Every timestamp the ledger stores or
/// compares goes through this first.
pub fn truncate_stamp(at: DateTime<Utc>) -> DateTime<Utc> { at.trunc_subsecs(6) }

/// Fixed-width RFC 3339 so stamps compare correctly as strings.
pub fn encode_stamp(at: DateTime<Utc>) -> String {
  truncate_stamp(at).to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn json_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;

  fn payload(value: Value) -> Payload { Payload::from_value(value).unwrap() }

  #[test]
  fn fingerprint_ignores_key_order_at_every_depth() {
    let a = payload(json!({
      "total": 100,
      "items": [{ "sku": "LATTE", "qty": 2 }],
      "customer": { "name": "Asha", "phone": "98" },
    }));
    let b = payload(json!({
      "customer": { "phone": "98", "name": "Asha" },
      "items": [{ "qty": 2, "sku": "LATTE" }],
      "total": 100,
    }));
    assert_eq!(a.fingerprint(), b.fingerprint());
  }

  #[test]
  fn fingerprint_tracks_values_and_array_order() {
    let a = payload(json!({ "items": [1, 2] }));
    let b = payload(json!({ "items": [2, 1] }));
    let c = payload(json!({ "items": [1, 2], "total": 1 }));
    assert_ne!(a.fingerprint(), b.fingerprint());
    assert_ne!(a.fingerprint(), c.fingerprint());
  }

  #[test]
  fn canonical_json_sorts_nested_keys() {
    let v = json!({ "b": { "z": 1, "a": null }, "a": [true, "x"] });
    assert_eq!(canonical_json(&v), r#"{"a":[true,"x"],"b":{"a":null,"z":1}}"#);
  }

  #[test]
  fn changed_fields_ignores_bookkeeping_keys() {
    let before = payload(json!({
      "total": 100,
      "status": "open",
      "_status": "active",
      "_source_timestamp": "2024-01-01T00:00:00.000000Z",
    }));
    let after = payload(json!({
      "total": 120,
      "status": "open",
      "_source_timestamp": "2024-01-01T00:00:01.000000Z",
    }));
    assert_eq!(after.changed_fields(&before), vec!["total".to_string()]);
  }

  #[test]
  fn changed_fields_counts_added_and_removed_fields() {
    let before = payload(json!({ "a": 1, "b": 2 }));
    let after = payload(json!({ "b": 2, "c": 3 }));
    assert_eq!(after.changed_fields(&before), vec!["a", "c"]);
  }

  #[test]
  fn nested_reordering_is_not_a_change() {
    let before = payload(json!({ "meta": { "x": 1, "y": 2 } }));
    let after = payload(json!({ "meta": { "y": 2, "x": 1 } }));
    assert!(after.changed_fields(&before).is_empty());
  }

  #[test]
  fn source_timestamp_round_trips_through_stamp() {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
    let mut p = Payload::new();
    p.stamp_time(SOURCE_TIMESTAMP, at);
    assert_eq!(p.source_timestamp(), Some(at));

    p.insert(SOURCE_TIMESTAMP, "yesterday");
    assert_eq!(p.source_timestamp(), None);
  }

  #[test]
  fn non_objects_are_malformed() {
    assert!(matches!(
      Payload::from_value(json!([1, 2])),
      Err(Error::MalformedPayload(_))
    ));
  }
}
