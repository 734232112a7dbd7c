//! Connection settings, deserialised from the `[store]` table of the server
//! config.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// Upper bound on a single read, including time spent queued behind other
  /// calls on the connection thread. Writes are bounded by `busy_timeout_ms`
  /// only.
  pub query_timeout_ms: u64,
  /// How long SQLite itself waits on a locked database before failing.
  pub busy_timeout_ms:  u64,
}

impl StoreConfig {
  pub fn query_timeout(&self) -> Duration { Duration::from_millis(self.query_timeout_ms) }

  pub fn busy_timeout(&self) -> Duration { Duration::from_millis(self.busy_timeout_ms) }
}

impl Default for StoreConfig {
  fn default() -> Self { Self { query_timeout_ms: 5000, busy_timeout_ms: 2000 } }
}
