//! Raw intake log records.
//!
//! Ingestion collaborators log every upstream payload they receive before
//! normalising it. A `completed` intake log with no ledger event pointing at
//! it is a gap: the record was received but never reached the ledger.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RawLogStatus {
  #[default]
  Received,
  Processing,
  Completed,
  Failed,
}

impl RawLogStatus {
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownRawLogStatus(s.to_owned()))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLog {
  pub log_id:        Uuid,
  /// Upstream system, e.g. `petpooja` or `google_drive`.
  pub source_type:   String,
  pub received_at:   DateTime<Utc>,
  pub status:        RawLogStatus,
  /// The table or schema the payload was destined for.
  pub target_schema: Option<String>,
  pub payload:       Option<Value>,
}

/// Input to [`Ledger::record_raw_intake`](crate::ledger::Ledger::record_raw_intake).
#[derive(Debug, Clone)]
pub struct NewRawLog {
  pub source_type:   String,
  pub status:        RawLogStatus,
  pub target_schema: Option<String>,
  pub payload:       Option<Value>,
}

impl NewRawLog {
  pub fn new(source_type: impl Into<String>) -> Self {
    Self {
      source_type:   source_type.into(),
      status:        RawLogStatus::default(),
      target_schema: None,
      payload:       None,
    }
  }
}
