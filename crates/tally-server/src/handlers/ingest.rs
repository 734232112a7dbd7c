//! `POST /ingest`: the entry point for ingestion collaborators.

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{
  classify::{IncomingData, Intent},
  entity::EntityType,
  event::{EventRecord, EventType},
  payload::Payload,
  store::LedgerStore,
};
use tracing::warn;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// One normalised upstream record.
#[derive(Debug, Deserialize)]
pub struct IngestBody {
  pub entity_type:      EntityType,
  pub entity_id:        String,
  pub data:             Payload,
  pub source_system:    String,
  pub source_timestamp: Option<DateTime<Utc>>,
  #[serde(default)]
  pub is_cancellation:  bool,
  #[serde(default)]
  pub is_deletion:      bool,
  /// Intake log this record was parsed from.
  pub raw_log_id:       Option<Uuid>,
}

impl From<IngestBody> for IncomingData {
  fn from(b: IngestBody) -> Self {
    IncomingData {
      entity_type:      b.entity_type,
      entity_id:        b.entity_id,
      data:             b.data,
      source_system:    b.source_system,
      source_timestamp: b.source_timestamp,
      intent:           Intent::from_flags(b.is_cancellation, b.is_deletion),
      raw_log_id:       b.raw_log_id,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
  pub event_type: EventType,
  /// `None` when the write was skipped (duplicate, no-op or stale).
  pub event:      Option<EventRecord>,
}

/// `POST /ingest`: 201 with the appended event, or 200 with `event: null`
/// when nothing changed.
///
/// A successful write also refreshes the entity's materialized row. A
/// failed refresh is logged and left for the consistency check.
pub async fn handler<S: LedgerStore>(
  State(state): State<AppState<S>>,
  Json(body): Json<IngestBody>,
) -> Result<impl IntoResponse, ApiError> {
  let (event_type, event) = state.ledger.process_incoming_data(body.into()).await?;

  let status = match &event {
    Some(record) => {
      if let Err(e) = state
        .reconciler
        .refresh_projection(record.entity_type, &record.entity_id)
        .await
      {
        warn!(entity = %record.key(), error = %e, "projection refresh failed");
      }
      StatusCode::CREATED
    }
    None => StatusCode::OK,
  };

  Ok((status, Json(IngestResponse { event_type, event })))
}
