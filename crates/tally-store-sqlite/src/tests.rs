//! Integration tests for `SqliteStore` and the ledger write path against an
//! in-memory database.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Value, json};
use tally_core::{
  Error as CoreError,
  classify::{IncomingData, Intent},
  clock::ManualClock,
  config::{LedgerConfig, TerminalPolicy},
  entity::EntityType,
  event::{ActorType, EventRecord, EventType, NewEvent},
  intake::{NewRawLog, RawLog, RawLogStatus},
  ledger::Ledger,
  payload::{self, Payload},
  store::{AppendOutcome, LedgerStore},
};

use crate::{SqliteStore, StoreConfig};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap() }

async fn ledger_with(config: LedgerConfig) -> (Ledger<SqliteStore>, Arc<ManualClock>) {
  let clock = Arc::new(ManualClock::new(t0()));
  let ledger = Ledger::new(Arc::new(store().await), config).with_clock(clock.clone());
  (ledger, clock)
}

async fn ledger() -> (Ledger<SqliteStore>, Arc<ManualClock>) {
  ledger_with(LedgerConfig::default()).await
}

fn payload(value: Value) -> Payload { Payload::from_value(value).unwrap() }

fn order(id: &str, data: Value) -> IncomingData {
  IncomingData::new(EntityType::Order, id, payload(data), "petpooja")
}

// ─── Raw store ───────────────────────────────────────────────────────────────

fn record(entity_id: &str, version: u64, at: DateTime<Utc>) -> EventRecord {
  let data = payload(json!({ "total": version }));
  EventRecord {
    event_id:         EventRecord::derive_id(EntityType::Order, entity_id, at),
    entity_type:      EntityType::Order,
    entity_id:        entity_id.into(),
    event_type:       if version == 1 { EventType::Created } else { EventType::Updated },
    event_timestamp:  at,
    source_timestamp: None,
    version,
    data_before:      None,
    data_fingerprint: data.fingerprint(),
    data_after:       data,
    source_system:    "petpooja".into(),
    changed_fields:   vec![],
    change_reason:    None,
    actor_type:       ActorType::System,
    actor_id:         None,
    raw_log_id:       None,
  }
}

#[tokio::test]
async fn append_and_read_back() {
  let s = store().await;
  let r = record("O-1", 1, t0());

  let outcome = s.append(&r, Some(0)).await.unwrap();
  assert_eq!(outcome, AppendOutcome::Appended);

  let latest = s.latest(EntityType::Order, "O-1").await.unwrap().unwrap();
  assert_eq!(latest, r);
}

#[tokio::test]
async fn append_with_stale_expectation_conflicts() {
  let s = store().await;
  s.append(&record("O-1", 1, t0()), Some(0)).await.unwrap();

  let late = record("O-1", 1, t0() + Duration::seconds(1));
  let outcome = s.append(&late, Some(0)).await.unwrap();
  assert_eq!(outcome, AppendOutcome::Conflict { current: 1 });

  let history = s.history(EntityType::Order, "O-1", 10).await.unwrap();
  assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn forced_append_of_taken_version_conflicts() {
  let s = store().await;
  s.append(&record("O-1", 1, t0()), None).await.unwrap();

  let dup = record("O-1", 1, t0() + Duration::seconds(5));
  let outcome = s.append(&dup, None).await.unwrap();
  assert_eq!(outcome, AppendOutcome::Conflict { current: 1 });
}

#[tokio::test]
async fn ledger_rows_cannot_be_updated_or_deleted() {
  let s = store().await;
  s.append(&record("O-1", 1, t0()), Some(0)).await.unwrap();

  let results = s
    .conn
    .call(|conn| {
      let update = conn.execute("UPDATE ledger_events SET version = 9", []).is_err();
      let delete = conn.execute("DELETE FROM ledger_events", []).is_err();
      Ok((update, delete))
    })
    .await
    .unwrap();
  assert_eq!(results, (true, true));
}

#[tokio::test]
async fn timestamps_and_ids_in_window() {
  let s = store().await;
  for (i, id) in ["O-1", "O-2", "O-3"].iter().enumerate() {
    let at = t0() + Duration::hours(i as i64);
    s.append(&record(id, 1, at), Some(0)).await.unwrap();
  }

  let ids = s
    .entity_ids_in_window(EntityType::Order, t0(), t0() + Duration::hours(1))
    .await
    .unwrap();
  assert_eq!(ids, vec!["O-1", "O-2"]);

  let stamps = s
    .event_timestamps(EntityType::Order, t0(), t0() + Duration::hours(5))
    .await
    .unwrap();
  assert_eq!(stamps, vec![t0(), t0() + Duration::hours(1), t0() + Duration::hours(2)]);

  let none = s
    .event_timestamps(EntityType::Expense, t0(), t0() + Duration::hours(5))
    .await
    .unwrap();
  assert!(none.is_empty());
}

#[tokio::test]
async fn projections_upsert_and_validate_names() {
  let s = store().await;
  let data = payload(json!({ "total": 5 }));

  assert!(!s.projection_exists("orders", "O-1").await.unwrap());
  s.write_projection("orders", "O-1", &data, t0()).await.unwrap();
  s.write_projection("orders", "O-1", &data, t0() + Duration::hours(1))
    .await
    .unwrap();
  assert!(s.projection_exists("orders", "O-1").await.unwrap());

  let refreshed_at: String = s
    .conn
    .call(|conn| {
      Ok(conn.query_row(
        "SELECT refreshed_at FROM orders WHERE entity_id = 'O-1'",
        [],
        |row| row.get(0),
      )?)
    })
    .await
    .unwrap();
  assert_eq!(refreshed_at, payload::encode_stamp(t0() + Duration::hours(1)));

  let err = s.projection_exists("orders; --", "O-1").await.unwrap_err();
  assert!(matches!(err, crate::Error::InvalidIdentifier(_)));

  assert!(s.projection_exists("no_such_table", "O-1").await.is_err());
}

// ─── Versioning ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn versions_are_dense_and_monotonic() {
  let (l, clock) = ledger().await;

  for total in 1..=5 {
    clock.advance(Duration::minutes(1));
    let (_, written) = l
      .process_incoming_data(order("O-1", json!({ "total": total })))
      .await
      .unwrap();
    assert!(written.is_some());
  }

  let latest = l.get_latest_version(EntityType::Order, "O-1").await.unwrap();
  assert_eq!(latest.version, 5);

  let history = l.get_entity_history(EntityType::Order, "O-1", 100).await.unwrap();
  let mut versions: Vec<u64> = history.iter().map(|r| r.version).collect();
  assert_eq!(versions, vec![5, 4, 3, 2, 1]);
  versions.sort();
  assert_eq!(versions, (1..=5).collect::<Vec<_>>());
}

#[tokio::test]
async fn unknown_entity_has_version_zero() {
  let (l, _) = ledger().await;
  let latest = l.get_latest_version(EntityType::Order, "nope").await.unwrap();
  assert_eq!(latest.version, 0);
  assert!(latest.data.is_none());
  assert!(latest.fingerprint.is_none());
}

#[tokio::test]
async fn first_write_is_created_and_stamped_active() {
  let (l, _) = ledger().await;
  let (event_type, written) = l
    .process_incoming_data(order("O-1", json!({ "total": 100 })))
    .await
    .unwrap();

  assert_eq!(event_type, EventType::Created);
  let written = written.unwrap();
  assert_eq!(written.version, 1);
  assert_eq!(written.data_after.status(), Some("active"));
  assert!(written.data_before.is_none());
}

#[tokio::test]
async fn forced_version_is_used_and_conflicts_are_not_retried() {
  let (l, _) = ledger().await;

  let mut event = NewEvent::new(
    EntityType::Expense,
    "E-1",
    EventType::Created,
    payload(json!({ "amount": 250.0 })),
    "google_drive",
  );
  event.force_version = Some(7);
  let written = l.log_event(event.clone()).await.unwrap().unwrap();
  assert_eq!(written.version, 7);

  let err = l.log_event(event).await.unwrap_err();
  assert!(matches!(err, CoreError::VersionConflict { attempted: 7, .. }));
}

#[tokio::test]
async fn concurrent_writers_never_share_a_version() {
  // Wall clock: retries need fresh timestamps for distinct event ids.
  let config = LedgerConfig { max_write_retries: 50, ..Default::default() };
  let l = Ledger::new(Arc::new(store().await), config);

  let mut tasks = Vec::new();
  for n in 0..8 {
    let l = l.clone();
    tasks.push(tokio::spawn(async move {
      let event = NewEvent::new(
        EntityType::Inventory,
        "milk",
        EventType::Amended,
        Payload::from_value(json!({ "litres": n })).unwrap(),
        "stock_take",
      );
      l.log_event(event).await
    }));
  }
  for task in tasks {
    task.await.unwrap().unwrap();
  }

  let history = l.get_entity_history(EntityType::Inventory, "milk", 100).await.unwrap();
  let mut versions: Vec<u64> = history.iter().map(|r| r.version).collect();
  versions.sort();
  assert_eq!(versions, (1..=8).collect::<Vec<_>>());
}

// ─── Deduplication ───────────────────────────────────────────────────────────

#[tokio::test]
async fn identical_reingestion_writes_once() {
  let (l, clock) = ledger().await;
  l.process_incoming_data(order("O-1", json!({ "total": 100 })))
    .await
    .unwrap();

  clock.advance(Duration::seconds(1));
  let first = l
    .process_incoming_data(order("O-1", json!({ "total": 120 })))
    .await
    .unwrap();
  assert!(first.1.is_some());

  clock.advance(Duration::seconds(1));
  let second = l
    .process_incoming_data(order("O-1", json!({ "total": 120 })))
    .await
    .unwrap();
  assert_eq!(second, (EventType::Updated, None));

  let history = l.get_entity_history(EntityType::Order, "O-1", 10).await.unwrap();
  assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn reordered_keys_are_not_a_new_version() {
  let (l, clock) = ledger().await;
  let first = NewEvent::new(
    EntityType::Recipe,
    "R-1",
    EventType::Created,
    payload(json!({ "name": "Cold brew", "steps": { "b": 2, "a": 1 } })),
    "google_drive",
  );
  l.log_event(first).await.unwrap().unwrap();

  clock.advance(Duration::seconds(1));
  let reordered = NewEvent::new(
    EntityType::Recipe,
    "R-1",
    EventType::Updated,
    payload(json!({ "steps": { "a": 1, "b": 2 }, "name": "Cold brew" })),
    "google_drive",
  );
  assert!(l.log_event(reordered).await.unwrap().is_none());
  assert_eq!(
    l.get_latest_version(EntityType::Recipe, "R-1").await.unwrap().version,
    1
  );
}

#[tokio::test]
async fn update_differing_only_in_bookkeeping_is_skipped() {
  let (l, clock) = ledger().await;
  l.process_incoming_data(order("O-1", json!({ "total": 100 })).at(t0()))
    .await
    .unwrap();

  clock.advance(Duration::seconds(1));
  let (_, written) = l
    .process_incoming_data(order("O-1", json!({ "total": 100 })).at(t0() + Duration::seconds(5)))
    .await
    .unwrap();
  assert!(written.is_none());
}

// ─── Conflict resolution ─────────────────────────────────────────────────────

#[tokio::test]
async fn stale_write_is_rejected_regardless_of_payload() {
  let (l, clock) = ledger().await;
  let t2 = t0() + Duration::minutes(10);
  l.process_incoming_data(order("O-1", json!({ "total": 100 })).at(t2))
    .await
    .unwrap();

  clock.advance(Duration::seconds(1));
  let (event_type, written) = l
    .process_incoming_data(
      order("O-1", json!({ "total": 5, "status": "totally different" }))
        .at(t2 - Duration::minutes(1)),
    )
    .await
    .unwrap();

  assert_eq!(event_type, EventType::Updated);
  assert!(written.is_none());
  assert_eq!(
    l.get_latest_version(EntityType::Order, "O-1").await.unwrap().version,
    1
  );
}

#[tokio::test]
async fn resend_with_same_sub_microsecond_timestamp_is_stale() {
  let (l, clock) = ledger().await;
  let ts = t0() + Duration::nanoseconds(500);
  let (_, created) = l
    .process_incoming_data(order("O-1", json!({ "total": 100 })).at(ts))
    .await
    .unwrap();
  let created = created.unwrap();
  assert_eq!(created.source_timestamp, Some(t0()));
  assert_eq!(
    l.get_latest_state(EntityType::Order, "O-1").await.unwrap(),
    Some(created.data_after.clone())
  );

  clock.advance(Duration::seconds(1));
  let (_, written) = l
    .process_incoming_data(order("O-1", json!({ "total": 999 })).at(ts))
    .await
    .unwrap();

  assert!(written.is_none());
  let history = l.get_entity_history(EntityType::Order, "O-1", 10).await.unwrap();
  assert_eq!(history, vec![created]);
}

#[tokio::test]
async fn end_to_end_order_scenario() {
  let (l, clock) = ledger().await;
  let t = t0();

  let (created, _) = l
    .process_incoming_data(order("O-1", json!({ "total": 100 })).at(t))
    .await
    .unwrap();
  assert_eq!(created, EventType::Created);

  clock.advance(Duration::seconds(1));
  let (updated, written) = l
    .process_incoming_data(order("O-1", json!({ "total": 120 })).at(t + Duration::seconds(1)))
    .await
    .unwrap();
  assert_eq!(updated, EventType::Updated);
  let written = written.unwrap();
  assert_eq!(written.version, 2);
  assert_eq!(written.changed_fields, vec!["total".to_string()]);
  let before = written.data_before.unwrap();
  assert_eq!(before.get("total"), Some(&json!(100)));

  clock.advance(Duration::seconds(1));
  let (_, late) = l
    .process_incoming_data(
      order("O-1", json!({ "total": 999 })).at(t + Duration::milliseconds(500)),
    )
    .await
    .unwrap();
  assert!(late.is_none());

  let state = l.get_latest_state(EntityType::Order, "O-1").await.unwrap().unwrap();
  assert_eq!(state.get("total"), Some(&json!(120)));
  assert_eq!(state.source_timestamp(), Some(t + Duration::seconds(1)));
}

// ─── Soft delete, cancel, restore ────────────────────────────────────────────

#[tokio::test]
async fn delete_then_restore_keeps_full_history() {
  let (l, clock) = ledger().await;
  l.process_incoming_data(order("O-1", json!({ "total": 100 })))
    .await
    .unwrap();

  clock.advance(Duration::minutes(1));
  let (deleted, _) = l
    .process_incoming_data(
      order("O-1", json!({ "total": 100 })).with_intent(Intent::Delete),
    )
    .await
    .unwrap();
  assert_eq!(deleted, EventType::Deleted);

  clock.advance(Duration::minutes(1));
  l.restore_entity(EntityType::Order, "O-1", payload(json!({ "total": 110 })), "petpooja")
    .await
    .unwrap()
    .unwrap();

  let history = l.get_entity_history(EntityType::Order, "O-1", 10).await.unwrap();
  let types: Vec<EventType> = history.iter().map(|r| r.event_type).collect();
  assert_eq!(types, vec![EventType::Restored, EventType::Deleted, EventType::Created]);
  assert_eq!(history[1].data_after.status(), Some("deleted"));
  assert!(history[1].data_after.get(payload::DELETED_AT).is_some());

  let state = l.get_latest_state(EntityType::Order, "O-1").await.unwrap().unwrap();
  assert_eq!(state.status(), Some("active"));
  assert_eq!(state.get("total"), Some(&json!(110)));
}

#[tokio::test]
async fn cancellation_is_classified_even_for_new_entities() {
  let (l, _) = ledger().await;
  let (event_type, written) = l
    .process_incoming_data(order("O-9", json!({ "total": 40 })).with_intent(Intent::Cancel))
    .await
    .unwrap();
  assert_eq!(event_type, EventType::Cancelled);
  let written = written.unwrap();
  assert_eq!(written.version, 1);
  assert_eq!(written.data_after.status(), Some("cancelled"));
}

#[tokio::test]
async fn terminal_entities_accept_updates_by_default() {
  let (l, clock) = ledger().await;
  l.process_incoming_data(order("O-1", json!({ "total": 1 })).with_intent(Intent::Cancel))
    .await
    .unwrap();

  clock.advance(Duration::seconds(1));
  let (_, written) = l
    .process_incoming_data(order("O-1", json!({ "total": 2 })))
    .await
    .unwrap();
  assert!(written.is_some());
}

#[tokio::test]
async fn reject_policy_refuses_writes_after_terminal_events() {
  let (l, clock) = ledger_with(LedgerConfig {
    terminal_policy: TerminalPolicy::Reject,
    ..Default::default()
  })
  .await;
  l.process_incoming_data(order("O-1", json!({ "total": 1 })).with_intent(Intent::Delete))
    .await
    .unwrap();

  clock.advance(Duration::seconds(1));
  let err = l
    .process_incoming_data(order("O-1", json!({ "total": 2 })))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    CoreError::TerminalState { state: EventType::Deleted, attempted: EventType::Updated, .. }
  ));

  clock.advance(Duration::seconds(1));
  let restored = l
    .restore_entity(EntityType::Order, "O-1", payload(json!({ "total": 2 })), "petpooja")
    .await
    .unwrap();
  assert!(restored.is_some());
}

#[tokio::test]
async fn void_carries_the_latest_snapshot_forward() {
  let (l, clock) = ledger().await;
  l.process_incoming_data(order("O-1", json!({ "total": 75 })))
    .await
    .unwrap();

  clock.advance(Duration::seconds(1));
  let voided = l
    .void_entity(EntityType::Order, "O-1", "petpooja", Some("duplicate bill".into()))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(voided.event_type, EventType::Voided);
  assert_eq!(voided.data_after.get("total"), Some(&json!(75)));
  assert_eq!(voided.data_after.status(), Some("voided"));
  assert_eq!(voided.change_reason.as_deref(), Some("duplicate bill"));
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn state_at_time_reconstructs_past_snapshots() {
  let (l, clock) = ledger().await;
  l.process_incoming_data(order("O-1", json!({ "total": 100 })))
    .await
    .unwrap();

  clock.advance(Duration::hours(1));
  l.process_incoming_data(order("O-1", json!({ "total": 150 })))
    .await
    .unwrap();

  let before_any = l
    .get_state_at_time(EntityType::Order, "O-1", t0() - Duration::seconds(1))
    .await
    .unwrap();
  assert!(before_any.is_none());

  let early = l
    .get_state_at_time(EntityType::Order, "O-1", t0() + Duration::minutes(30))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(early.get("total"), Some(&json!(100)));

  let later = l
    .get_state_at_time(EntityType::Order, "O-1", t0() + Duration::hours(2))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(later.get("total"), Some(&json!(150)));
}

#[tokio::test]
async fn history_is_bounded_and_restartable() {
  let (l, clock) = ledger().await;
  for total in 0..6 {
    clock.advance(Duration::seconds(1));
    l.process_incoming_data(order("O-1", json!({ "total": total })))
      .await
      .unwrap();
  }

  let first = l.get_entity_history(EntityType::Order, "O-1", 2).await.unwrap();
  let again = l.get_entity_history(EntityType::Order, "O-1", 2).await.unwrap();
  assert_eq!(first.len(), 2);
  assert_eq!(first, again);
  assert_eq!(first[0].version, 6);
}

#[tokio::test]
async fn malformed_typed_payload_is_rejected_before_writing() {
  let (l, _) = ledger().await;
  let err = l
    .process_incoming_data(order("O-1", json!({ "total": "one hundred" })))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::MalformedPayload(_)));
  assert_eq!(
    l.get_latest_version(EntityType::Order, "O-1").await.unwrap().version,
    0
  );
}

// ─── Raw intake ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn unlinked_completed_raw_logs_are_reported() {
  let (l, _) = ledger().await;

  let linked = l
    .record_raw_intake(NewRawLog::new("petpooja"))
    .await
    .unwrap();
  let orphan = l
    .record_raw_intake(NewRawLog {
      target_schema: Some("orders".into()),
      ..NewRawLog::new("petpooja")
    })
    .await
    .unwrap();
  let pending = l
    .record_raw_intake(NewRawLog::new("google_drive"))
    .await
    .unwrap();

  let mut incoming = order("O-1", json!({ "total": 10 }));
  incoming.raw_log_id = Some(linked.log_id);
  l.process_incoming_data(incoming).await.unwrap();

  assert!(l.complete_raw_intake(linked.log_id).await.unwrap());
  assert!(l.complete_raw_intake(orphan.log_id).await.unwrap());
  assert!(!l.complete_raw_intake(uuid::Uuid::new_v4()).await.unwrap());

  let gaps = l
    .store()
    .unlinked_raw_logs(t0() - Duration::days(1), 100)
    .await
    .unwrap();
  assert_eq!(gaps.len(), 1);
  assert_eq!(gaps[0].log_id, orphan.log_id);
  assert_eq!(gaps[0].status, RawLogStatus::Completed);
  assert_eq!(gaps[0].target_schema.as_deref(), Some("orders"));
  assert_ne!(gaps[0].log_id, pending.log_id);
}

// ─── Store failures ──────────────────────────────────────────────────────────

#[tokio::test]
async fn appends_are_not_cut_short_by_the_read_timeout() {
  let config = StoreConfig { query_timeout_ms: 0, ..Default::default() };
  let s = SqliteStore::open_in_memory_with(&config).await.unwrap();

  let outcome = s.append(&record("O-1", 1, t0()), Some(0)).await.unwrap();
  assert_eq!(outcome, AppendOutcome::Appended);

  let rows: i64 = s
    .conn
    .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM ledger_events", [], |r| r.get(0))?))
    .await
    .unwrap();
  assert_eq!(rows, 1);
}

/// Delegates to SQLite but refuses every append with an I/O error.
struct FailingAppends {
  inner: SqliteStore,
}

fn io_error() -> crate::Error {
  crate::Error::Database(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(
    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_IOERR),
    Some("disk I/O error".into()),
  )))
}

impl LedgerStore for FailingAppends {
  type Error = crate::Error;

  async fn append(
    &self,
    _record: &EventRecord,
    _expected_current: Option<u64>,
  ) -> crate::Result<AppendOutcome> {
    Err(io_error())
  }

  async fn latest(
    &self,
    entity_type: EntityType,
    entity_id: &str,
  ) -> crate::Result<Option<EventRecord>> {
    self.inner.latest(entity_type, entity_id).await
  }

  async fn history(
    &self,
    entity_type: EntityType,
    entity_id: &str,
    limit: usize,
  ) -> crate::Result<Vec<EventRecord>> {
    self.inner.history(entity_type, entity_id, limit).await
  }

  async fn state_at(
    &self,
    entity_type: EntityType,
    entity_id: &str,
    at: DateTime<Utc>,
  ) -> crate::Result<Option<EventRecord>> {
    self.inner.state_at(entity_type, entity_id, at).await
  }

  async fn entity_ids_in_window(
    &self,
    entity_type: EntityType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> crate::Result<Vec<String>> {
    self.inner.entity_ids_in_window(entity_type, start, end).await
  }

  async fn event_timestamps(
    &self,
    entity_type: EntityType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> crate::Result<Vec<DateTime<Utc>>> {
    self.inner.event_timestamps(entity_type, start, end).await
  }

  async fn record_raw_log(&self, log: &RawLog) -> crate::Result<()> {
    self.inner.record_raw_log(log).await
  }

  async fn set_raw_log_status(
    &self,
    log_id: uuid::Uuid,
    status: RawLogStatus,
  ) -> crate::Result<bool> {
    self.inner.set_raw_log_status(log_id, status).await
  }

  async fn unlinked_raw_logs(
    &self,
    since: DateTime<Utc>,
    limit: usize,
  ) -> crate::Result<Vec<RawLog>> {
    self.inner.unlinked_raw_logs(since, limit).await
  }

  async fn write_projection(
    &self,
    table: &str,
    entity_id: &str,
    data: &Payload,
    refreshed_at: DateTime<Utc>,
  ) -> crate::Result<()> {
    self.inner.write_projection(table, entity_id, data, refreshed_at).await
  }

  async fn projection_exists(&self, table: &str, entity_id: &str) -> crate::Result<bool> {
    self.inner.projection_exists(table, entity_id).await
  }
}

#[tokio::test]
async fn write_failures_propagate_and_write_nothing() {
  let store = Arc::new(FailingAppends { inner: store().await });
  let l = Ledger::new(Arc::clone(&store), LedgerConfig::default());

  let err = l
    .process_incoming_data(order("O-1", json!({ "total": 10 })))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Store { transient: false, .. }), "{err}");

  let event = NewEvent::new(
    EntityType::Order,
    "O-1",
    EventType::Created,
    payload(json!({ "total": 10 })),
    "petpooja",
  );
  let err = l.log_event(event).await.unwrap_err();
  assert!(matches!(err, CoreError::Store { transient: false, .. }), "{err}");

  let rows = store.inner.history(EntityType::Order, "O-1", 10).await.unwrap();
  assert!(rows.is_empty());
}
