//! Ledger configuration, deserialised from the `[ledger]` table of the
//! server config.

use serde::Deserialize;

/// What to do with a write to an entity whose latest event is `cancelled`,
/// `deleted` or `voided`. `restored` and `reconciled` events are accepted
/// under every policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalPolicy {
  /// Accept the write.
  #[default]
  Permissive,
  /// Accept the write and log a warning.
  Warn,
  /// Refuse with [`Error::TerminalState`](crate::Error::TerminalState).
  Reject,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
  /// Compare-and-append attempts after the first before giving up with a
  /// version conflict.
  pub max_write_retries: u32,
  pub terminal_policy:   TerminalPolicy,
  /// Upper bound on `limit` for history reads.
  pub history_limit_max: usize,
}

impl Default for LedgerConfig {
  fn default() -> Self {
    Self {
      max_write_retries: 5,
      terminal_policy:   TerminalPolicy::default(),
      history_limit_max: 1000,
    }
  }
}
