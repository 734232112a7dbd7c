//! HTTP surface for the Tally event ledger.
//!
//! Exposes an axum [`Router`] over the ledger read APIs, upstream ingestion
//! and the reconciliation engine, backed by any [`LedgerStore`].
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | `GET`  | `/entities/{type}/{id}/history?limit=` | newest-first history |
//! | `GET`  | `/entities/{type}/{id}/latest` | latest version (0 if unknown) |
//! | `GET`  | `/entities/{type}/{id}/state?at=` | point-in-time snapshot |
//! | `GET`  | `/entities/{type}/{id}/consistency` | materialized-table check |
//! | `POST` | `/ingest` | classify and write one upstream record |
//! | `POST` | `/reconcile/daily?hours_back=` | run the daily reconciliation |
//! | `POST` | `/reconcile/source/{type}` | reconcile against source records |
//! | `GET`  | `/reconcile/sequence-gaps/{type}?prefix=&start=&end=` | missing sequential IDs |

pub mod error;
pub mod handlers;

pub use error::ApiError;

use std::path::PathBuf;

use axum::{
  Router,
  routing::{get, post},
};
use serde::Deserialize;
use tally_core::{config::LedgerConfig, ledger::Ledger, store::LedgerStore};
use tally_reconcile::{ReconcileConfig, Reconciler};
use tally_store_sqlite::StoreConfig;
use tower_http::trace::TraceLayer;

use handlers::{entities, ingest, reconcile};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `tally.toml` and `TALLY_*`
/// environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:           String,
  pub port:           u16,
  pub store_path:     PathBuf,
  pub ledger:         LedgerConfig,
  pub store:          StoreConfig,
  pub reconciliation: ReconcileConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:           "127.0.0.1".to_string(),
      port:           8080,
      store_path:     PathBuf::from("tally.db"),
      ledger:         LedgerConfig::default(),
      store:          StoreConfig::default(),
      reconciliation: ReconcileConfig::default(),
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub ledger:     Ledger<S>,
  pub reconciler: Reconciler<S>,
}

impl<S: LedgerStore> AppState<S> {
  /// Both services share `ledger`'s store and clock.
  pub fn new(ledger: Ledger<S>, reconcile: ReconcileConfig) -> Self {
    let reconciler = Reconciler::new(ledger.clone(), reconcile);
    Self { ledger, reconciler }
  }
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { ledger: self.ledger.clone(), reconciler: self.reconciler.clone() }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the ledger API.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: LedgerStore + 'static,
{
  Router::new()
    // Entities
    .route("/entities/{entity_type}/{entity_id}/history",     get(entities::history::<S>))
    .route("/entities/{entity_type}/{entity_id}/latest",      get(entities::latest::<S>))
    .route("/entities/{entity_type}/{entity_id}/state",       get(entities::state_at::<S>))
    .route("/entities/{entity_type}/{entity_id}/consistency", get(entities::consistency::<S>))
    // Ingestion
    .route("/ingest", post(ingest::handler::<S>))
    // Reconciliation
    .route("/reconcile/daily", post(reconcile::daily::<S>))
    .route("/reconcile/source/{entity_type}", post(reconcile::from_source::<S>))
    .route("/reconcile/sequence-gaps/{entity_type}", get(reconcile::sequence_gaps::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
