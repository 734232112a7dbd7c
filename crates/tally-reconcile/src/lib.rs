//! Gap detection and repair for the Tally event ledger.
//!
//! The [`Reconciler`] compares the ledger against the raw intake log, against
//! the expected density of events over time, and against the ID sets of
//! authoritative upstream systems. Missing records are written back through
//! the ledger's normal write path as `reconciled` events.
//!
//! Reconciliation is fail-soft: a failing check is recorded in the run's
//! [`ReconciliationResult`] and the remaining checks still run.

mod engine;

pub mod config;
pub mod error;
pub mod gaps;
pub mod report;

pub use config::{ReconcileConfig, TimeGapCheck};
pub use engine::{RECOVERY_REASON, Reconciler, SYNC_REASON, SourceRecord};
pub use error::{Error, Result};
pub use report::{
  ConsistencyStatus, GapReport, RawLogGap, ReconciliationResult,
  SourceComparison, TimeGap,
};
