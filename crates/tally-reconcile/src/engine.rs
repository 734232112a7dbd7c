//! [`Reconciler`]: the checks, the recovery path and the daily run.

use std::{collections::HashMap, future::Future};

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tally_core::{
  classify,
  entity::EntityType,
  event::{ActorType, EventType, NewEvent},
  ledger::Ledger,
  payload::{self, Payload},
  store::LedgerStore,
};
use tracing::{debug, error, info, warn};

use crate::{
  Error, Result,
  config::ReconcileConfig,
  gaps,
  report::{
    ConsistencyStatus, GapReport, RawLogGap, ReconciliationResult,
    SourceComparison, TimeGap,
  },
};

/// `change_reason` of events written for records missing from the ledger.
pub const RECOVERY_REASON: &str = "Recovered by reconciliation bot - gap detection";

/// `change_reason` of events written when the ledger disagrees with the
/// authoritative source.
pub const SYNC_REASON: &str = "Updated by reconciliation bot - source mismatch";

/// One record as held by an authoritative upstream system.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRecord {
  pub entity_id:        String,
  pub data:             Payload,
  pub source_timestamp: Option<DateTime<Utc>>,
}

/// Detects divergence between the ledger and its inputs, and repairs what
/// it can through the ledger's write path.
pub struct Reconciler<S> {
  ledger: Ledger<S>,
  config: ReconcileConfig,
}

impl<S> Clone for Reconciler<S> {
  fn clone(&self) -> Self {
    Self { ledger: self.ledger.clone(), config: self.config.clone() }
  }
}

fn check_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
  if start > end {
    return Err(Error::InvalidWindow { start, end });
  }
  Ok(())
}

/// One record per entity ID, in first-seen order, each the last occurrence.
fn last_per_entity(records: &[SourceRecord]) -> Vec<&SourceRecord> {
  let mut slot: HashMap<&str, usize> = HashMap::new();
  let mut unique: Vec<&SourceRecord> = Vec::with_capacity(records.len());
  for record in records {
    match slot.get(record.entity_id.as_str()) {
      Some(&i) => unique[i] = record,
      None => {
        slot.insert(&record.entity_id, unique.len());
        unique.push(record);
      }
    }
  }
  if unique.len() < records.len() {
    warn!(
      duplicates = records.len() - unique.len(),
      "source records repeat entity IDs; keeping the last of each"
    );
  }
  unique
}

impl<S: LedgerStore> Reconciler<S> {
  pub fn new(ledger: Ledger<S>, config: ReconcileConfig) -> Self {
    Self { ledger, config }
  }

  pub fn ledger(&self) -> &Ledger<S> { &self.ledger }

  pub fn config(&self) -> &ReconcileConfig { &self.config }

  // ── Checks ──────────────────────────────────────────────────────────────

  /// Completed intake logs from the last `hours_back` hours that no ledger
  /// event references.
  pub async fn find_unprocessed_raw_logs(
    &self,
    hours_back: u32,
    limit: usize,
  ) -> Result<Vec<RawLogGap>> {
    let since = self.ledger.now() - Duration::hours(i64::from(hours_back));
    let logs = self
      .ledger
      .store()
      .unlinked_raw_logs(since, limit)
      .await
      .map_err(tally_core::Error::store)?;
    Ok(logs.into_iter().map(RawLogGap::from).collect())
  }

  /// Missing IDs in the numeric sequence `{id_prefix}{n}` among entities
  /// written in the window. See [`gaps::sequence_gaps`].
  pub async fn find_sequence_gaps(
    &self,
    entity_type: EntityType,
    id_prefix: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Vec<String>> {
    check_window(start, end)?;
    let ids = self
      .ledger
      .store()
      .entity_ids_in_window(entity_type, start, end)
      .await
      .map_err(tally_core::Error::store)?;
    gaps::sequence_gaps(&ids, id_prefix, self.config.max_sequence_span)
  }

  /// Stretches of more than `expected_interval_minutes` without any event
  /// of `entity_type`, by ledger-write time.
  pub async fn find_time_gaps(
    &self,
    entity_type: EntityType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    expected_interval_minutes: u32,
  ) -> Result<Vec<TimeGap>> {
    check_window(start, end)?;
    let stamps = self
      .ledger
      .store()
      .event_timestamps(entity_type, start, end)
      .await
      .map_err(tally_core::Error::store)?;
    Ok(gaps::time_gaps(
      &stamps,
      Duration::minutes(i64::from(expected_interval_minutes)),
    ))
  }

  pub async fn compare_with_source_ids<'a>(
    &self,
    entity_type: EntityType,
    source_ids: impl IntoIterator<Item = &'a str>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<SourceComparison> {
    check_window(start, end)?;
    let ledger_ids = self
      .ledger
      .store()
      .entity_ids_in_window(entity_type, start, end)
      .await
      .map_err(tally_core::Error::store)?;
    Ok(gaps::compare_ids(
      source_ids,
      ledger_ids.iter().map(String::as_str),
    ))
  }

  /// Cross-check the ledger's latest snapshot of an entity against its
  /// materialized table. Never fails; problems become
  /// [`ConsistencyStatus::Error`].
  pub async fn check_data_consistency(
    &self,
    entity_type: EntityType,
    entity_id: &str,
  ) -> ConsistencyStatus {
    match self.ledger.get_latest_state(entity_type, entity_id).await {
      Ok(Some(_)) => {}
      Ok(None) => return ConsistencyStatus::NotFoundInEventLog,
      Err(e) => return ConsistencyStatus::Error { message: e.to_string() },
    }

    let Some(table) = self.config.table_for(entity_type) else {
      return ConsistencyStatus::UnknownEntityType;
    };

    match self.ledger.store().projection_exists(table, entity_id).await {
      Ok(true) => ConsistencyStatus::Consistent,
      Ok(false) => ConsistencyStatus::MissingInMainTable,
      Err(e) => ConsistencyStatus::Error { message: e.to_string() },
    }
  }

  // ── Repair ──────────────────────────────────────────────────────────────

  /// Write a record the ledger is missing as a `reconciled` event.
  ///
  /// Goes through [`Ledger::log_event`], so the record is versioned and
  /// fingerprinted like any live write. Returns `false` if the ledger
  /// skipped the write.
  pub async fn recover_missing_record(
    &self,
    entity_type: EntityType,
    entity_id: &str,
    data: Payload,
    source_system: &str,
    original_timestamp: Option<DateTime<Utc>>,
  ) -> Result<bool> {
    let written = self
      .write_reconciled(
        entity_type,
        entity_id,
        data,
        source_system,
        original_timestamp,
        RECOVERY_REASON,
      )
      .await?;
    if written {
      info!(%entity_type, entity_id, "recovered missing record");
    }
    Ok(written)
  }

  /// Refresh the materialized row of an entity from its latest snapshot.
  /// Returns `false` if the entity has no events or no materialized table.
  pub async fn refresh_projection(
    &self,
    entity_type: EntityType,
    entity_id: &str,
  ) -> Result<bool> {
    let Some(table) = self.config.table_for(entity_type) else {
      return Ok(false);
    };
    let Some(state) = self.ledger.get_latest_state(entity_type, entity_id).await?
    else {
      return Ok(false);
    };
    self
      .ledger
      .store()
      .write_projection(table, entity_id, &state, self.ledger.now())
      .await
      .map_err(tally_core::Error::store)?;
    Ok(true)
  }

  /// Reconcile the ledger against an authoritative source's records for a
  /// window.
  ///
  /// Records the ledger is missing are recovered. Records whose business
  /// fields differ from the ledger's latest snapshot get a `reconciled`
  /// event carrying the source data, unless the ledger already holds a
  /// newer or equal source timestamp. IDs only the ledger knows are
  /// reported, not repaired. When `records` names an ID more than once, the
  /// last occurrence wins.
  pub async fn recover_from_source(
    &self,
    entity_type: EntityType,
    source_system: &str,
    records: &[SourceRecord],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> ReconciliationResult {
    let mut result = ReconciliationResult::new(self.ledger.now());
    let check = "source comparison";
    let records = last_per_entity(records);
    let ids: Vec<&str> = records.iter().map(|r| r.entity_id.as_str()).collect();
    let ids = ids.as_slice();

    let comparison = self
      .retrying(check, move || {
        self.compare_with_source_ids(entity_type, ids.iter().copied(), start, end)
      })
      .await;
    let comparison = match comparison {
      Ok(c) => c,
      Err(e) => {
        error!(%entity_type, error = %e, "{check} failed");
        result.record_error(check, e);
        result.end_time = self.ledger.now();
        return result;
      }
    };

    for &record in &records {
      let missing = comparison.missing_in_db.binary_search(&record.entity_id).is_ok();
      let outcome = if missing {
        self
          .recover_missing_record(
            entity_type,
            &record.entity_id,
            record.data.clone(),
            source_system,
            record.source_timestamp,
          )
          .await
      } else {
        self.sync_existing(entity_type, source_system, record).await
      };

      match outcome {
        Ok(true) if missing => result.records_recovered += 1,
        Ok(true) => result.records_updated += 1,
        Ok(false) => {}
        Err(e) => {
          error!(%entity_type, entity_id = %record.entity_id, error = %e, "recovery failed");
          result.record_error(&format!("recover {entity_type}/{}", record.entity_id), e);
        }
      }
    }

    if !comparison.missing_in_db.is_empty() {
      result.gaps_found.push(GapReport::MissingInDb {
        entity_type,
        entity_ids: comparison.missing_in_db,
      });
    }
    if !comparison.missing_in_source.is_empty() {
      warn!(
        %entity_type,
        count = comparison.missing_in_source.len(),
        "ledger has records unknown to the source"
      );
      result.gaps_found.push(GapReport::MissingInSource {
        entity_type,
        entity_ids: comparison.missing_in_source,
      });
    }

    result.end_time = self.ledger.now();
    result
  }

  async fn sync_existing(
    &self,
    entity_type: EntityType,
    source_system: &str,
    record: &SourceRecord,
  ) -> Result<bool> {
    let latest = self
      .ledger
      .get_latest_state(entity_type, &record.entity_id)
      .await?;
    if let Some(latest) = &latest {
      if classify::is_stale(record.source_timestamp, Some(latest)) {
        debug!(
          %entity_type,
          entity_id = %record.entity_id,
          "source record is stale, not syncing"
        );
        return Ok(false);
      }
      if record.data.changed_fields(latest).is_empty() {
        return Ok(false);
      }
    }
    self
      .write_reconciled(
        entity_type,
        &record.entity_id,
        record.data.clone(),
        source_system,
        record.source_timestamp,
        SYNC_REASON,
      )
      .await
  }

  async fn write_reconciled(
    &self,
    entity_type: EntityType,
    entity_id: &str,
    mut data: Payload,
    source_system: &str,
    original_timestamp: Option<DateTime<Utc>>,
    reason: &str,
  ) -> Result<bool> {
    if data.status().is_none() {
      data.insert(payload::STATUS, "active");
    }
    if let Some(ts) = original_timestamp {
      data.stamp_time(payload::SOURCE_TIMESTAMP, ts);
    }

    let mut event = NewEvent::new(
      entity_type,
      entity_id,
      EventType::Reconciled,
      data,
      source_system,
    );
    event.source_timestamp = original_timestamp;
    event.change_reason = Some(reason.to_owned());
    event.actor_type = ActorType::Reconciliation;

    Ok(self.ledger.log_event(event).await?.is_some())
  }

  // ── Scheduled run ───────────────────────────────────────────────────────

  /// The scheduled pass: the unprocessed-raw-log scan followed by every
  /// configured time-gap check over the last `hours_back` hours.
  ///
  /// Each check is isolated. A failing check lands in `errors` and the
  /// rest still run.
  pub async fn run_daily_reconciliation(&self, hours_back: u32) -> ReconciliationResult {
    let start_time = self.ledger.now();
    let window_start = start_time - Duration::hours(i64::from(hours_back));
    let mut result = ReconciliationResult::new(start_time);
    info!(hours_back, "starting daily reconciliation");

    let limit = self.config.raw_log_limit;
    let check = "unprocessed raw logs";
    match self
      .retrying(check, move || self.find_unprocessed_raw_logs(hours_back, limit))
      .await
    {
      Ok(logs) if logs.is_empty() => {}
      Ok(logs) => {
        warn!(count = logs.len(), "completed intake logs without ledger events");
        result
          .gaps_found
          .push(GapReport::UnprocessedRawLogs { count: logs.len(), logs });
      }
      Err(e) => {
        error!(error = %e, "{check} check failed");
        result.record_error(check, e);
      }
    }

    for gap_check in &self.config.time_gap_checks {
      let entity_type = gap_check.entity_type;
      let minutes = gap_check.expected_interval_minutes;
      let check = format!("time gaps for {entity_type}");

      match self
        .retrying(&check, move || {
          self.find_time_gaps(entity_type, window_start, start_time, minutes)
        })
        .await
      {
        Ok(gaps) if gaps.is_empty() => {}
        Ok(gaps) => {
          warn!(%entity_type, count = gaps.len(), "silent periods found");
          result.gaps_found.push(GapReport::TimeGaps {
            entity_type,
            expected_interval_minutes: minutes,
            gaps,
          });
        }
        Err(e) => {
          error!(%entity_type, error = %e, "time gap check failed");
          result.record_error(&check, e);
        }
      }
    }

    result.end_time = self.ledger.now();
    info!(
      gaps = result.gaps_found.len(),
      errors = result.errors.len(),
      "daily reconciliation finished"
    );
    result
  }

  /// Run `op`, retrying transient failures up to `transient_retries` times.
  async fn retrying<T, F, Fut>(&self, check: &str, mut op: F) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let mut attempt = 0;
    loop {
      match op().await {
        Err(e) if e.is_transient() && attempt < self.config.transient_retries => {
          attempt += 1;
          warn!(check, attempt, error = %e, "transient failure, retrying");
        }
        other => return other,
      }
    }
  }
}
