//! Reconciliation triggers.

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tally_core::store::LedgerStore;
use tally_reconcile::{ReconciliationResult, SourceRecord};

use crate::{AppState, error::ApiError, handlers::parse_entity_type};

#[derive(Debug, Deserialize)]
pub struct DailyParams {
  /// Defaults to the configured `hours_back`.
  pub hours_back: Option<u32>,
}

/// `POST /reconcile/daily[?hours_back=N]`
///
/// Always 200: failed checks are reported in the result's `errors`.
pub async fn daily<S: LedgerStore>(
  State(state): State<AppState<S>>,
  Query(params): Query<DailyParams>,
) -> Json<ReconciliationResult> {
  let hours_back = params
    .hours_back
    .unwrap_or(state.reconciler.config().hours_back);
  Json(state.reconciler.run_daily_reconciliation(hours_back).await)
}

/// JSON body accepted by `POST /reconcile/source/{type}`.
#[derive(Debug, Deserialize)]
pub struct SourceBody {
  pub source_system: String,
  pub start:         DateTime<Utc>,
  pub end:           DateTime<Utc>,
  pub records:       Vec<SourceRecord>,
}

/// `POST /reconcile/source/{type}`
pub async fn from_source<S: LedgerStore>(
  State(state): State<AppState<S>>,
  Path(entity_type): Path<String>,
  Json(body): Json<SourceBody>,
) -> Result<Json<ReconciliationResult>, ApiError> {
  let entity_type = parse_entity_type(&entity_type)?;
  if body.start > body.end {
    return Err(ApiError::BadRequest("start is after end".into()));
  }
  let result = state
    .reconciler
    .recover_from_source(
      entity_type,
      &body.source_system,
      &body.records,
      body.start,
      body.end,
    )
    .await;
  Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct SequenceParams {
  pub prefix: String,
  pub start:  DateTime<Utc>,
  pub end:    DateTime<Utc>,
}

/// `GET /reconcile/sequence-gaps/{type}?prefix=ORD&start=...&end=...`
pub async fn sequence_gaps<S: LedgerStore>(
  State(state): State<AppState<S>>,
  Path(entity_type): Path<String>,
  Query(params): Query<SequenceParams>,
) -> Result<Json<Vec<String>>, ApiError> {
  let entity_type = parse_entity_type(&entity_type)?;
  let missing = state
    .reconciler
    .find_sequence_gaps(entity_type, &params.prefix, params.start, params.end)
    .await?;
  Ok(Json(missing))
}
