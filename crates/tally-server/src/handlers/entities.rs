//! Read handlers for `/entities/{type}/{id}/...`.

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tally_core::{
  event::{EventRecord, LatestVersion},
  payload::Payload,
  store::LedgerStore,
};
use tally_reconcile::ConsistencyStatus;

use crate::{AppState, error::ApiError, handlers::parse_entity_type};

const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  /// Defaults to 100; clamped to the ledger's `history_limit_max`.
  pub limit: Option<usize>,
}

/// `GET /entities/{type}/{id}/history[?limit=N]`
pub async fn history<S: LedgerStore>(
  State(state): State<AppState<S>>,
  Path((entity_type, entity_id)): Path<(String, String)>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<EventRecord>>, ApiError> {
  let entity_type = parse_entity_type(&entity_type)?;
  let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
  let events = state
    .ledger
    .get_entity_history(entity_type, &entity_id, limit)
    .await?;
  Ok(Json(events))
}

/// `GET /entities/{type}/{id}/latest`
///
/// Unknown entities answer with version 0 and no data rather than 404.
pub async fn latest<S: LedgerStore>(
  State(state): State<AppState<S>>,
  Path((entity_type, entity_id)): Path<(String, String)>,
) -> Result<Json<LatestVersion>, ApiError> {
  let entity_type = parse_entity_type(&entity_type)?;
  Ok(Json(state.ledger.get_latest_version(entity_type, &entity_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct StateParams {
  pub at: DateTime<Utc>,
}

/// `GET /entities/{type}/{id}/state?at=<rfc3339>`
pub async fn state_at<S: LedgerStore>(
  State(state): State<AppState<S>>,
  Path((entity_type, entity_id)): Path<(String, String)>,
  Query(params): Query<StateParams>,
) -> Result<Json<Payload>, ApiError> {
  let entity_type = parse_entity_type(&entity_type)?;
  state
    .ledger
    .get_state_at_time(entity_type, &entity_id, params.at)
    .await?
    .map(Json)
    .ok_or_else(|| {
      ApiError::NotFound(format!("{entity_type}/{entity_id} has no state at {}", params.at))
    })
}

/// `GET /entities/{type}/{id}/consistency`
pub async fn consistency<S: LedgerStore>(
  State(state): State<AppState<S>>,
  Path((entity_type, entity_id)): Path<(String, String)>,
) -> Result<Json<ConsistencyStatus>, ApiError> {
  let entity_type = parse_entity_type(&entity_type)?;
  Ok(Json(
    state
      .reconciler
      .check_data_consistency(entity_type, &entity_id)
      .await,
  ))
}
