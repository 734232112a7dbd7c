//! Business entities tracked by the ledger, and typed views over their
//! payloads.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::{Error, Result, payload::Payload};

// ─── EntityType ──────────────────────────────────────────────────────────────

/// The kind of business entity an event describes.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityType {
  Order,
  OrderItem,
  Payment,
  Discount,
  Expense,
  Purchase,
  Recipe,
  Wastage,
  Inventory,
  Subscription,
  Employee,
  Supplier,
  Customer,
}

impl EntityType {
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownEntityType(s.to_owned()))
  }
}

// ─── EntityKey ───────────────────────────────────────────────────────────────

/// The identity of one versioned stream in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
  pub entity_type: EntityType,
  /// Business key (e.g. the POS order ID); stable across versions.
  pub entity_id:   String,
}

impl EntityKey {
  pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
    Self { entity_type, entity_id: entity_id.into() }
  }
}

impl fmt::Display for EntityKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.entity_type, self.entity_id)
  }
}

// ─── Typed views ─────────────────────────────────────────────────────────────

/// Known order fields. Everything else lands in `extra`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderView {
  pub total:        Option<f64>,
  pub status:       Option<String>,
  pub order_type:   Option<String>,
  pub payment_type: Option<String>,
  pub created_on:   Option<String>,
  #[serde(flatten)]
  pub extra:        Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpenseView {
  pub amount:       Option<f64>,
  pub category:     Option<String>,
  pub description:  Option<String>,
  pub expense_date: Option<String>,
  pub payment_mode: Option<String>,
  #[serde(flatten)]
  pub extra:        Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseView {
  pub supplier:  Option<String>,
  pub item:      Option<String>,
  pub quantity:  Option<f64>,
  pub unit_cost: Option<f64>,
  pub amount:    Option<f64>,
  #[serde(flatten)]
  pub extra:     Map<String, Value>,
}

/// A payload interpreted according to its entity type.
///
/// Upstream shapes evolve, so every known field is optional and unknown
/// fields are kept. A known field with the wrong JSON type is rejected.
#[derive(Debug, Clone)]
pub enum EntityView {
  Order(OrderView),
  Expense(ExpenseView),
  Purchase(PurchaseView),
  Untyped(Map<String, Value>),
}

impl EntityView {
  pub fn parse(entity_type: EntityType, payload: &Payload) -> Result<Self> {
    let value = Value::Object(payload.as_map().clone());
    let malformed =
      |e: serde_json::Error| Error::MalformedPayload(format!("{entity_type}: {e}"));

    Ok(match entity_type {
      EntityType::Order => {
        Self::Order(serde_json::from_value(value).map_err(malformed)?)
      }
      EntityType::Expense => {
        Self::Expense(serde_json::from_value(value).map_err(malformed)?)
      }
      EntityType::Purchase => {
        Self::Purchase(serde_json::from_value(value).map_err(malformed)?)
      }
      _ => Self::Untyped(payload.as_map().clone()),
    })
  }
}
