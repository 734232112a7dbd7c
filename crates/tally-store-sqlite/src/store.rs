//! [`SqliteStore`]: the SQLite implementation of [`LedgerStore`].

use std::{path::Path, time::Duration};

use chrono::{DateTime, Utc};
use rusqlite::{ErrorCode, OptionalExtension as _, TransactionBehavior};
use tally_core::{
  entity::EntityType,
  event::EventRecord,
  intake::{RawLog, RawLogStatus},
  payload::Payload,
  store::{AppendOutcome, LedgerStore},
};
use uuid::Uuid;

use crate::{
  Error, Result, StoreConfig,
  encode::{
    EVENT_COLUMNS, RAW_LOG_COLUMNS, RawEvent, RawIntake, checked_identifier, decode_dt,
    encode_date, encode_dt, encode_fields, encode_payload, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Tally ledger backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  timeout:         Duration,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, timeout: config.query_timeout() };
    store.init_schema(config.busy_timeout()).await?;
    Ok(store)
  }

  /// Open an in-memory store with default settings.
  pub async fn open_in_memory() -> Result<Self> {
    Self::open_in_memory_with(&StoreConfig::default()).await
  }

  pub async fn open_in_memory_with(config: &StoreConfig) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, timeout: config.query_timeout() };
    store.init_schema(config.busy_timeout()).await?;
    Ok(store)
  }

  async fn init_schema(&self, busy_timeout: Duration) -> Result<()> {
    self
      .call_to_completion(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    tracing::debug!("ledger schema initialised");
    Ok(())
  }

  /// Run `f` on the connection thread, bounded by the query timeout.
  ///
  /// A timed-out `f` still runs to completion on the connection thread, so
  /// only reads go through here.
  async fn call<F, R>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&mut rusqlite::Connection) -> tokio_rusqlite::Result<R> + Send + 'static,
    R: Send + 'static,
  {
    match tokio::time::timeout(self.timeout, self.conn.call(f)).await {
      Ok(result) => Ok(result?),
      Err(_) => Err(Error::Timeout(self.timeout)),
    }
  }

  /// Run `f` on the connection thread and wait for its outcome. Lock waits
  /// inside `f` are bounded by SQLite's busy timeout.
  async fn call_to_completion<F, R>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&mut rusqlite::Connection) -> tokio_rusqlite::Result<R> + Send + 'static,
    R: Send + 'static,
  {
    Ok(self.conn.call(f).await?)
  }

  /// Run a `SELECT <EVENT_COLUMNS> ...` query and decode the rows.
  async fn query_events(
    &self,
    sql: String,
    params: Vec<rusqlite::types::Value>,
  ) -> Result<Vec<EventRecord>> {
    let raws: Vec<RawEvent> = self
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_record).collect()
  }
}

fn text(s: impl Into<String>) -> rusqlite::types::Value {
  rusqlite::types::Value::Text(s.into())
}

// ─── LedgerStore impl ────────────────────────────────────────────────────────

impl LedgerStore for SqliteStore {
  type Error = Error;

  // ── Ledger writes ─────────────────────────────────────────────────────────

  async fn append(
    &self,
    record: &EventRecord,
    expected_current: Option<u64>,
  ) -> Result<AppendOutcome> {
    let event_id         = record.event_id.clone();
    let entity_type      = record.entity_type.as_ref().to_owned();
    let entity_id        = record.entity_id.clone();
    let event_type       = record.event_type.as_ref().to_owned();
    let event_timestamp  = encode_dt(record.event_timestamp);
    let event_date       = encode_date(record.event_timestamp);
    let source_timestamp = record.source_timestamp.map(encode_dt);
    let version          = record.version as i64;
    let data_before      = record.data_before.as_ref().map(encode_payload).transpose()?;
    let data_after       = encode_payload(&record.data_after)?;
    let fingerprint      = record.data_fingerprint.clone();
    let source_system    = record.source_system.clone();
    let changed_fields   = encode_fields(&record.changed_fields)?;
    let change_reason    = record.change_reason.clone();
    let actor_type       = record.actor_type.as_ref().to_owned();
    let actor_id         = record.actor_id.clone();
    let raw_log_id       = record.raw_log_id.map(encode_uuid);

    // The caller must learn whether the row landed; a timeout here could
    // report failure for a committed append.
    self
      .call_to_completion(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: i64 = tx.query_row(
          "SELECT COALESCE(MAX(version), 0) FROM ledger_events
           WHERE entity_type = ?1 AND entity_id = ?2",
          rusqlite::params![entity_type, entity_id],
          |r| r.get(0),
        )?;
        let current = current as u64;

        if expected_current.is_some_and(|expected| expected != current) {
          return Ok(AppendOutcome::Conflict { current });
        }

        let inserted = tx.execute(
          "INSERT INTO ledger_events (
             event_id, entity_type, entity_id, event_type, event_timestamp,
             event_date, source_timestamp, version, data_before, data_after,
             data_fingerprint, source_system, changed_fields, change_reason,
             actor_type, actor_id, raw_log_id
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
          rusqlite::params![
            event_id,
            entity_type,
            entity_id,
            event_type,
            event_timestamp,
            event_date,
            source_timestamp,
            version,
            data_before,
            data_after,
            fingerprint,
            source_system,
            changed_fields,
            change_reason,
            actor_type,
            actor_id,
            raw_log_id,
          ],
        );

        match inserted {
          Ok(_) => {}
          // Version or event ID already taken; the dropped transaction
          // rolls back.
          Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation =>
          {
            return Ok(AppendOutcome::Conflict { current });
          }
          Err(e) => return Err(e.into()),
        }

        tx.commit()?;
        Ok(AppendOutcome::Appended)
      })
      .await
  }

  // ── Ledger reads ──────────────────────────────────────────────────────────

  async fn latest(
    &self,
    entity_type: EntityType,
    entity_id: &str,
  ) -> Result<Option<EventRecord>> {
    let sql = format!(
      "SELECT {EVENT_COLUMNS} FROM ledger_events
       WHERE entity_type = ?1 AND entity_id = ?2
       ORDER BY version DESC, event_timestamp DESC
       LIMIT 1"
    );
    let mut rows = self
      .query_events(sql, vec![text(entity_type.as_ref()), text(entity_id)])
      .await?;
    Ok(rows.pop())
  }

  async fn history(
    &self,
    entity_type: EntityType,
    entity_id: &str,
    limit: usize,
  ) -> Result<Vec<EventRecord>> {
    let sql = format!(
      "SELECT {EVENT_COLUMNS} FROM ledger_events
       WHERE entity_type = ?1 AND entity_id = ?2
       ORDER BY version DESC, event_timestamp DESC
       LIMIT ?3"
    );
    self
      .query_events(sql, vec![
        text(entity_type.as_ref()),
        text(entity_id),
        rusqlite::types::Value::Integer(limit as i64),
      ])
      .await
  }

  async fn state_at(
    &self,
    entity_type: EntityType,
    entity_id: &str,
    at: DateTime<Utc>,
  ) -> Result<Option<EventRecord>> {
    let sql = format!(
      "SELECT {EVENT_COLUMNS} FROM ledger_events
       WHERE entity_type = ?1 AND entity_id = ?2 AND event_timestamp <= ?3
       ORDER BY event_timestamp DESC, version DESC
       LIMIT 1"
    );
    let mut rows = self
      .query_events(sql, vec![
        text(entity_type.as_ref()),
        text(entity_id),
        text(encode_dt(at)),
      ])
      .await?;
    Ok(rows.pop())
  }

  async fn entity_ids_in_window(
    &self,
    entity_type: EntityType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Vec<String>> {
    let entity_type = entity_type.as_ref().to_owned();
    let (start, end) = (encode_dt(start), encode_dt(end));

    self
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT entity_id FROM ledger_events
           WHERE entity_type = ?1 AND event_timestamp BETWEEN ?2 AND ?3
           ORDER BY entity_id",
        )?;
        let ids = stmt
          .query_map(rusqlite::params![entity_type, start, end], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
      })
      .await
  }

  async fn event_timestamps(
    &self,
    entity_type: EntityType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Vec<DateTime<Utc>>> {
    let entity_type = entity_type.as_ref().to_owned();
    let (start, end) = (encode_dt(start), encode_dt(end));

    let raws: Vec<String> = self
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT event_timestamp FROM ledger_events
           WHERE entity_type = ?1 AND event_timestamp BETWEEN ?2 AND ?3
           ORDER BY event_timestamp",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![entity_type, start, end], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    raws.iter().map(|s| decode_dt(s)).collect()
  }

  // ── Raw intake log ────────────────────────────────────────────────────────

  async fn record_raw_log(&self, log: &RawLog) -> Result<()> {
    let log_id        = encode_uuid(log.log_id);
    let source_type   = log.source_type.clone();
    let received_at   = encode_dt(log.received_at);
    let status        = log.status.as_ref().to_owned();
    let target_schema = log.target_schema.clone();
    let payload_json  = log.payload.as_ref().map(serde_json::to_string).transpose()?;

    self
      .call_to_completion(move |conn| {
        conn.execute(
          "INSERT INTO raw_intake_log
             (log_id, source_type, received_at, status, target_schema, payload_json)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            log_id,
            source_type,
            received_at,
            status,
            target_schema,
            payload_json,
          ],
        )?;
        Ok(())
      })
      .await
  }

  async fn set_raw_log_status(&self, log_id: Uuid, status: RawLogStatus) -> Result<bool> {
    let log_id = encode_uuid(log_id);
    let status = status.as_ref().to_owned();

    let updated = self
      .call_to_completion(move |conn| {
        Ok(conn.execute(
          "UPDATE raw_intake_log SET status = ?2 WHERE log_id = ?1",
          rusqlite::params![log_id, status],
        )?)
      })
      .await?;
    Ok(updated > 0)
  }

  async fn unlinked_raw_logs(
    &self,
    since: DateTime<Utc>,
    limit: usize,
  ) -> Result<Vec<RawLog>> {
    let since     = encode_dt(since);
    let completed = RawLogStatus::Completed.as_ref().to_owned();
    let limit     = limit as i64;

    let raws: Vec<RawIntake> = self
      .call(move |conn| {
        let sql = format!(
          "SELECT {RAW_LOG_COLUMNS} FROM raw_intake_log r
           WHERE r.status = ?1
             AND r.received_at >= ?2
             AND NOT EXISTS (
               SELECT 1 FROM ledger_events e WHERE e.raw_log_id = r.log_id
             )
           ORDER BY r.received_at
           LIMIT ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![completed, since, limit], RawIntake::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawIntake::into_raw_log).collect()
  }

  // ── Materialized tables ───────────────────────────────────────────────────

  async fn write_projection(
    &self,
    table: &str,
    entity_id: &str,
    data: &Payload,
    refreshed_at: DateTime<Utc>,
  ) -> Result<()> {
    let sql = format!(
      "INSERT INTO {} (entity_id, data_json, refreshed_at) VALUES (?1, ?2, ?3)
       ON CONFLICT (entity_id) DO UPDATE SET
         data_json = excluded.data_json,
         refreshed_at = excluded.refreshed_at",
      checked_identifier(table)?
    );
    let entity_id    = entity_id.to_owned();
    let data_json    = encode_payload(data)?;
    let refreshed_at = encode_dt(refreshed_at);

    self
      .call_to_completion(move |conn| {
        conn.execute(&sql, rusqlite::params![entity_id, data_json, refreshed_at])?;
        Ok(())
      })
      .await
  }

  async fn projection_exists(&self, table: &str, entity_id: &str) -> Result<bool> {
    let sql = format!(
      "SELECT 1 FROM {} WHERE entity_id = ?1",
      checked_identifier(table)?
    );
    let entity_id = entity_id.to_owned();

    self
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![entity_id], |_| Ok(true))
            .optional()?
            .unwrap_or(false),
        )
      })
      .await
  }
}
