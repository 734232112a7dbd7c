//! [`Ledger`]: the versioned, deduplicating write path and the read API.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  classify::{Classification, IncomingData, is_stale},
  clock::{Clock, SystemClock},
  config::{LedgerConfig, TerminalPolicy},
  entity::{EntityKey, EntityType, EntityView},
  event::{EventRecord, EventType, LatestVersion, NewEvent},
  intake::{NewRawLog, RawLog, RawLogStatus},
  payload::{self, Payload},
  store::{AppendOutcome, LedgerStore},
};

/// The event ledger over a storage backend.
///
/// Writes for the same entity are serialised optimistically: every append is
/// a compare-and-append against the version that was read, and a lost race
/// re-reads and re-plans the write from scratch.
pub struct Ledger<S> {
  store:  Arc<S>,
  config: LedgerConfig,
  clock:  Arc<dyn Clock>,
}

impl<S> Clone for Ledger<S> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      config: self.config.clone(),
      clock:  Arc::clone(&self.clock),
    }
  }
}

impl<S: LedgerStore> Ledger<S> {
  pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
    Self { store, config, clock: Arc::new(SystemClock) }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn config(&self) -> &LedgerConfig { &self.config }

  /// The clock's time at stored precision.
  pub fn now(&self) -> DateTime<Utc> { payload::truncate_stamp(self.clock.now()) }

  // ── Writes ──────────────────────────────────────────────────────────────

  /// Append one event, or return `None` when it would not change anything:
  /// an `updated` event whose fingerprint matches the latest version, or
  /// whose field diff against it is empty.
  ///
  /// Store failures are returned as errors; nothing is written partially.
  pub async fn log_event(&self, input: NewEvent) -> Result<Option<EventRecord>> {
    EntityView::parse(input.entity_type, &input.data_after)?;
    let key = input.key();
    let forced = input.force_version.is_some();

    self
      .commit(&key, forced, |latest, now| self.plan(&input, latest, now))
      .await
  }

  /// Classify an upstream record and write it.
  ///
  /// Returns the chosen event type with the written record, or with `None`
  /// when the write was skipped as a duplicate, a no-op, or a stale
  /// out-of-order update.
  pub async fn process_incoming_data(
    &self,
    incoming: IncomingData,
  ) -> Result<(EventType, Option<EventRecord>)> {
    EntityView::parse(incoming.entity_type, &incoming.data)?;
    let key = EntityKey::new(incoming.entity_type, incoming.entity_id.clone());
    let mut classified = EventType::Updated;

    let record = self
      .commit(&key, false, |latest, now| {
        let current_version = latest.map_or(0, |r| r.version);
        let classification = Classification::classify(incoming.intent, current_version);
        classified = classification.event_type();

        if classification == Classification::Update
          && is_stale(incoming.source_timestamp, latest.map(|r| &r.data_after))
        {
          debug!(
            entity = %key,
            source_timestamp = ?incoming.source_timestamp,
            "skipping stale update"
          );
          return Ok(None);
        }

        let mut data = incoming.data.clone();
        classification.stamp(&mut data, now);
        if let Some(ts) = incoming.source_timestamp {
          data.stamp_time(payload::SOURCE_TIMESTAMP, ts);
        }

        let mut event = NewEvent::new(
          incoming.entity_type,
          incoming.entity_id.clone(),
          classified,
          data,
          incoming.source_system.clone(),
        );
        event.source_timestamp = incoming.source_timestamp;
        event.raw_log_id = incoming.raw_log_id;

        self.plan(&event, latest, now)
      })
      .await?;

    Ok((classified, record))
  }

  /// Bring a deleted, cancelled or voided entity back with `data`.
  pub async fn restore_entity(
    &self,
    entity_type: EntityType,
    entity_id: &str,
    mut data: Payload,
    source_system: &str,
  ) -> Result<Option<EventRecord>> {
    data.insert(payload::STATUS, "active");
    data.stamp_time(payload::RESTORED_AT, self.now());
    self
      .log_event(NewEvent::new(
        entity_type,
        entity_id,
        EventType::Restored,
        data,
        source_system,
      ))
      .await
  }

  /// Void an entity. The latest snapshot is carried forward with the void
  /// markers stamped onto it.
  pub async fn void_entity(
    &self,
    entity_type: EntityType,
    entity_id: &str,
    source_system: &str,
    reason: Option<String>,
  ) -> Result<Option<EventRecord>> {
    let mut data = self
      .get_latest_state(entity_type, entity_id)
      .await?
      .unwrap_or_default();
    data.insert(payload::STATUS, "voided");
    data.stamp_time(payload::VOIDED_AT, self.now());

    let mut event =
      NewEvent::new(entity_type, entity_id, EventType::Voided, data, source_system);
    event.change_reason = reason;
    self.log_event(event).await
  }

  /// Read-plan-append loop shared by every write.
  async fn commit<F>(
    &self,
    key: &EntityKey,
    forced: bool,
    mut plan: F,
  ) -> Result<Option<EventRecord>>
  where
    F: FnMut(Option<&EventRecord>, DateTime<Utc>) -> Result<Option<EventRecord>>,
  {
    let mut attempt = 0;
    loop {
      let latest = self
        .store
        .latest(key.entity_type, &key.entity_id)
        .await
        .map_err(Error::store)?;
      let current = latest.as_ref().map_or(0, |r| r.version);

      let Some(record) = plan(latest.as_ref(), self.now())? else {
        return Ok(None);
      };

      let expected = if forced { None } else { Some(current) };
      match self.store.append(&record, expected).await.map_err(Error::store)? {
        AppendOutcome::Appended => {
          info!(
            entity = %key,
            version = record.version,
            event_type = %record.event_type,
            "event appended"
          );
          return Ok(Some(record));
        }
        AppendOutcome::Conflict { current } => {
          if forced || attempt >= self.config.max_write_retries {
            return Err(Error::VersionConflict {
              entity:    key.clone(),
              attempted: record.version,
            });
          }
          attempt += 1;
          warn!(
            entity = %key,
            attempted = record.version,
            found = current,
            attempt,
            "version conflict, retrying"
          );
        }
      }
    }
  }

  /// Build the record `input` would append on top of `latest`, or `None`
  /// if the write is a no-op.
  fn plan(
    &self,
    input: &NewEvent,
    latest: Option<&EventRecord>,
    now: DateTime<Utc>,
  ) -> Result<Option<EventRecord>> {
    let key = input.key();
    let fingerprint = input.data_after.fingerprint();
    let is_update = input.event_type == EventType::Updated;

    if is_update && latest.is_some_and(|r| r.data_fingerprint == fingerprint) {
      debug!(entity = %key, "skipping duplicate update (fingerprint match)");
      return Ok(None);
    }

    if let Some(prev) = latest {
      self.check_terminal(&key, prev.event_type, input.event_type)?;
    }

    let version = input
      .force_version
      .unwrap_or_else(|| latest.map_or(0, |r| r.version) + 1);

    let (data_before, changed_fields) = match (is_update, latest) {
      (true, Some(prev)) => {
        let changed = input.data_after.changed_fields(&prev.data_after);
        if changed.is_empty() {
          debug!(entity = %key, "skipping update with no changed fields");
          return Ok(None);
        }
        (Some(prev.data_after.clone()), changed)
      }
      _ => (input.data_before.clone(), Vec::new()),
    };

    Ok(Some(EventRecord {
      event_id: EventRecord::derive_id(input.entity_type, &input.entity_id, now),
      entity_type: input.entity_type,
      entity_id: input.entity_id.clone(),
      event_type: input.event_type,
      event_timestamp: now,
      source_timestamp: input.source_timestamp.map(payload::truncate_stamp),
      version,
      data_before,
      data_after: input.data_after.clone(),
      data_fingerprint: fingerprint,
      source_system: input.source_system.clone(),
      changed_fields,
      change_reason: input.change_reason.clone(),
      actor_type: input.actor_type,
      actor_id: input.actor_id.clone(),
      raw_log_id: input.raw_log_id,
    }))
  }

  fn check_terminal(
    &self,
    key: &EntityKey,
    state: EventType,
    attempted: EventType,
  ) -> Result<()> {
    if !state.is_terminal() || attempted.reopens() {
      return Ok(());
    }
    match self.config.terminal_policy {
      TerminalPolicy::Permissive => Ok(()),
      TerminalPolicy::Warn => {
        warn!(entity = %key, %state, %attempted, "write to entity in terminal state");
        Ok(())
      }
      TerminalPolicy::Reject => {
        Err(Error::TerminalState { entity: key.clone(), state, attempted })
      }
    }
  }

  // ── Raw intake ──────────────────────────────────────────────────────────

  /// Register an upstream payload as received.
  pub async fn record_raw_intake(&self, input: NewRawLog) -> Result<RawLog> {
    let log = RawLog {
      log_id:        Uuid::new_v4(),
      source_type:   input.source_type,
      received_at:   self.now(),
      status:        input.status,
      target_schema: input.target_schema,
      payload:       input.payload,
    };
    self.store.record_raw_log(&log).await.map_err(Error::store)?;
    Ok(log)
  }

  /// Mark an intake log as fully processed. Returns `false` if it does not
  /// exist.
  pub async fn complete_raw_intake(&self, log_id: Uuid) -> Result<bool> {
    self
      .store
      .set_raw_log_status(log_id, RawLogStatus::Completed)
      .await
      .map_err(Error::store)
  }

  // ── Reads ───────────────────────────────────────────────────────────────

  pub async fn get_latest_version(
    &self,
    entity_type: EntityType,
    entity_id: &str,
  ) -> Result<LatestVersion> {
    let latest = self
      .store
      .latest(entity_type, entity_id)
      .await
      .map_err(Error::store)?;
    Ok(latest.into())
  }

  /// The current snapshot of an entity, if it has any events.
  pub async fn get_latest_state(
    &self,
    entity_type: EntityType,
    entity_id: &str,
  ) -> Result<Option<Payload>> {
    Ok(self.get_latest_version(entity_type, entity_id).await?.data)
  }

  /// Newest-first history, at most `limit` (clamped to the configured
  /// maximum) events long.
  pub async fn get_entity_history(
    &self,
    entity_type: EntityType,
    entity_id: &str,
    limit: usize,
  ) -> Result<Vec<EventRecord>> {
    let limit = limit.min(self.config.history_limit_max);
    self
      .store
      .history(entity_type, entity_id, limit)
      .await
      .map_err(Error::store)
  }

  /// The snapshot that was current at `at`.
  pub async fn get_state_at_time(
    &self,
    entity_type: EntityType,
    entity_id: &str,
    at: DateTime<Utc>,
  ) -> Result<Option<Payload>> {
    let record = self
      .store
      .state_at(entity_type, entity_id, at)
      .await
      .map_err(Error::store)?;
    Ok(record.map(|r| r.data_after))
  }
}
