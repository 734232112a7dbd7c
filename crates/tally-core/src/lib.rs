//! Core types, the storage trait, and the write path for the Tally event
//! ledger.
//!
//! This crate is deliberately free of HTTP and database dependencies. Storage
//! backends implement [`store::LedgerStore`]; the [`ledger::Ledger`] service
//! layers versioning, deduplication and conflict resolution on top.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod classify;
pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod intake;
pub mod ledger;
pub mod payload;
pub mod store;

pub use error::{Error, Result};
