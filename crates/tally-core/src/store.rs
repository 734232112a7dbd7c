//! The `LedgerStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g. `tally-store-sqlite`).
//! The [`Ledger`](crate::ledger::Ledger) service and the reconciliation
//! engine depend on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  entity::EntityType,
  event::EventRecord,
  intake::{RawLog, RawLogStatus},
  payload::Payload,
};

/// Errors produced by a backend.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// `true` for failures that may succeed on retry (timeouts, lock
  /// contention).
  fn is_transient(&self) -> bool;
}

/// Result of a compare-and-append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
  Appended,
  /// Another writer got there first. `current` is the version found in the
  /// store when the append was refused.
  Conflict { current: u64 },
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a ledger backend.
///
/// The only mutation of `ledger_events` is [`append`](Self::append): rows are
/// never updated or deleted. Intake logs carry a mutable status and
/// materialized tables are refreshed in place; neither is authoritative.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait LedgerStore: Send + Sync {
  type Error: StoreError;

  // ── Ledger writes ─────────────────────────────────────────────────────

  /// Atomically append `record`.
  ///
  /// With `expected_current = Some(v)` the append only succeeds if the
  /// highest stored version for the entity is still `v`. With `None` only
  /// the uniqueness of `record.version` is checked. Either way a refused
  /// append writes nothing and reports [`AppendOutcome::Conflict`].
  fn append<'a>(
    &'a self,
    record: &'a EventRecord,
    expected_current: Option<u64>,
  ) -> impl Future<Output = Result<AppendOutcome, Self::Error>> + Send + 'a;

  // ── Ledger reads ──────────────────────────────────────────────────────

  /// The highest version for an entity, ties broken by newest
  /// `event_timestamp`.
  fn latest<'a>(
    &'a self,
    entity_type: EntityType,
    entity_id: &'a str,
  ) -> impl Future<Output = Result<Option<EventRecord>, Self::Error>> + Send + 'a;

  /// Up to `limit` events for an entity, newest first.
  fn history<'a>(
    &'a self,
    entity_type: EntityType,
    entity_id: &'a str,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<EventRecord>, Self::Error>> + Send + 'a;

  /// The most recent event with `event_timestamp <= at`.
  fn state_at<'a>(
    &'a self,
    entity_type: EntityType,
    entity_id: &'a str,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<EventRecord>, Self::Error>> + Send + 'a;

  /// Distinct entity IDs with at least one event in `[start, end]`.
  fn entity_ids_in_window(
    &self,
    entity_type: EntityType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// Event timestamps for an entity type within `[start, end]`, ascending.
  fn event_timestamps(
    &self,
    entity_type: EntityType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<DateTime<Utc>>, Self::Error>> + Send + '_;

  // ── Raw intake log ────────────────────────────────────────────────────

  fn record_raw_log<'a>(
    &'a self,
    log: &'a RawLog,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Returns `false` if no such log exists.
  fn set_raw_log_status(
    &self,
    log_id: Uuid,
    status: RawLogStatus,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// `completed` intake logs received at or after `since` that no ledger
  /// event references, oldest first.
  fn unlinked_raw_logs(
    &self,
    since: DateTime<Utc>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<RawLog>, Self::Error>> + Send + '_;

  // ── Materialized tables ───────────────────────────────────────────────

  /// Refresh the read-optimized copy of an entity in `table`, recording
  /// `refreshed_at` as the refresh time.
  fn write_projection<'a>(
    &'a self,
    table: &'a str,
    entity_id: &'a str,
    data: &'a Payload,
    refreshed_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn projection_exists<'a>(
    &'a self,
    table: &'a str,
    entity_id: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}
