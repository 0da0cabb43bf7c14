//! Registry entry: the persisted record binding a hub entity id to a unique id.
//!
//! The record survives restarts; only its `unique_id` is ever rewritten, by
//! the identity migration. The entity id the user sees stays stable.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::Timestamp;
use crate::error::{BridgeError, ValidationError};
use crate::id::RecordId;

/// Integration name recorded on every entry the bridge creates.
pub const PLATFORM: &str = "homekit_controller";

/// One entity registry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: RecordId,
    pub entity_id: String,
    pub domain: String,
    pub platform: String,
    pub unique_id: String,
    /// Unique id the record carried before its last migration.
    pub previous_unique_id: Option<String>,
    pub created_at: Timestamp,
    pub modified_at: Timestamp,
}

impl RegistryEntry {
    /// A fresh record for `platform`, validated.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Validation`] when `entity_id` or `unique_id` is empty.
    pub fn new(
        entity_id: impl Into<String>,
        domain: impl Into<String>,
        platform: impl Into<String>,
        unique_id: impl Into<String>,
    ) -> Result<Self, BridgeError> {
        let ts = Utc::now();
        let entry = Self {
            id: RecordId::new(),
            entity_id: entity_id.into(),
            domain: domain.into(),
            platform: platform.into(),
            unique_id: unique_id.into(),
            previous_unique_id: None,
            created_at: ts,
            modified_at: ts,
        };
        entry.validate()?;
        Ok(entry)
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Validation`] when `entity_id` or `unique_id` is empty.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.entity_id.is_empty() {
            return Err(ValidationError::EmptyEntityId.into());
        }
        if self.unique_id.is_empty() {
            return Err(ValidationError::EmptyUniqueId.into());
        }
        Ok(())
    }

    /// Point the record at `unique_id`, remembering the one it replaces.
    pub fn rename_unique_id(&mut self, unique_id: impl Into<String>) {
        let previous = std::mem::replace(&mut self.unique_id, unique_id.into());
        self.previous_unique_id = Some(previous);
        self.modified_at = Utc::now();
    }
}
