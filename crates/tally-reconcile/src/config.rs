//! Reconciliation settings, deserialised from the `[reconciliation]` table
//! of the server config.

use std::collections::BTreeMap;

use serde::Deserialize;
use tally_core::entity::EntityType;

/// One entity type whose events are expected at least every
/// `expected_interval_minutes`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimeGapCheck {
  pub entity_type:               EntityType,
  pub expected_interval_minutes: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
  /// Default look-back window of the daily run.
  pub hours_back:          u32,
  /// Cap on intake logs reported per run.
  pub raw_log_limit:       usize,
  pub time_gap_checks:     Vec<TimeGapCheck>,
  /// Extra attempts for a check that failed with a transient store error.
  pub transient_retries:   u32,
  /// Widest numeric ID range `find_sequence_gaps` will enumerate.
  pub max_sequence_span:   u64,
  /// Entity type → materialized read table.
  pub materialized_tables: BTreeMap<EntityType, String>,
}

impl Default for ReconcileConfig {
  fn default() -> Self {
    Self {
      hours_back:          24,
      raw_log_limit:       1000,
      time_gap_checks:     vec![TimeGapCheck {
        entity_type:               EntityType::Order,
        expected_interval_minutes: 120,
      }],
      transient_retries:   2,
      max_sequence_span:   100_000,
      materialized_tables: BTreeMap::from([
        (EntityType::Order, "orders".to_owned()),
        (EntityType::Expense, "expenses".to_owned()),
        (EntityType::Purchase, "purchases".to_owned()),
      ]),
    }
  }
}

impl ReconcileConfig {
  pub fn table_for(&self, entity_type: EntityType) -> Option<&str> {
    self.materialized_tables.get(&entity_type).map(String::as_str)
  }
}
