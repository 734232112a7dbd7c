pub mod entities;
pub mod ingest;
pub mod reconcile;

use tally_core::entity::EntityType;

use crate::error::ApiError;

/// Entity types arrive as path segments; unknown ones are a 400.
pub(super) fn parse_entity_type(raw: &str) -> Result<EntityType, ApiError> {
  Ok(EntityType::parse(raw)?)
}
