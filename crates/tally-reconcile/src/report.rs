//! Result types returned by the reconciler. All of them serialise to JSON
//! for the daily-job output and the HTTP API.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_core::{
  entity::EntityType,
  intake::{RawLog, RawLogStatus},
};
use uuid::Uuid;

// ─── Gaps ────────────────────────────────────────────────────────────────────

/// A completed intake log that never produced a ledger event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawLogGap {
  pub log_id:        Uuid,
  pub source_type:   String,
  pub received_at:   DateTime<Utc>,
  pub status:        RawLogStatus,
  pub target_schema: Option<String>,
}

impl From<RawLog> for RawLogGap {
  fn from(log: RawLog) -> Self {
    Self {
      log_id:        log.log_id,
      source_type:   log.source_type,
      received_at:   log.received_at,
      status:        log.status,
      target_schema: log.target_schema,
    }
  }
}

/// A silent stretch between two consecutive events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeGap {
  pub gap_start:   DateTime<Utc>,
  pub gap_end:     DateTime<Utc>,
  pub gap_minutes: i64,
}

/// Two-way difference between an upstream ID set and the ledger's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceComparison {
  /// Upstream has it, the ledger does not. Recoverable.
  pub missing_in_db:     Vec<String>,
  /// The ledger has it, upstream does not. Flagged only.
  pub missing_in_source: Vec<String>,
}

/// One finding of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GapReport {
  UnprocessedRawLogs {
    count: usize,
    logs:  Vec<RawLogGap>,
  },
  TimeGaps {
    entity_type:               EntityType,
    expected_interval_minutes: u32,
    gaps:                      Vec<TimeGap>,
  },
  MissingInDb {
    entity_type: EntityType,
    entity_ids:  Vec<String>,
  },
  MissingInSource {
    entity_type: EntityType,
    entity_ids:  Vec<String>,
  },
}

// ─── Run summary ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationResult {
  pub gaps_found:        Vec<GapReport>,
  pub records_recovered: u64,
  pub records_updated:   u64,
  pub errors:            Vec<String>,
  pub start_time:        DateTime<Utc>,
  pub end_time:          DateTime<Utc>,
}

impl ReconciliationResult {
  pub fn new(start_time: DateTime<Utc>) -> Self {
    Self {
      gaps_found: Vec::new(),
      records_recovered: 0,
      records_updated: 0,
      errors: Vec::new(),
      start_time,
      end_time: start_time,
    }
  }

  pub fn record_error(&mut self, check: &str, err: impl std::fmt::Display) {
    self.errors.push(format!("{check}: {err}"));
  }

  pub fn is_clean(&self) -> bool { self.gaps_found.is_empty() && self.errors.is_empty() }
}

// ─── Consistency ─────────────────────────────────────────────────────────────

/// Outcome of cross-checking one entity against its materialized table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConsistencyStatus {
  NotFoundInEventLog,
  /// The entity type has no materialized table.
  UnknownEntityType,
  /// The ledger has the entity; the projection step never wrote it.
  MissingInMainTable,
  Consistent,
  Error { message: String },
}
