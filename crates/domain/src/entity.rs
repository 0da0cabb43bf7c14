//! Entity: the hub-facing switch exposed for one service or characteristic.
//!
//! An entity never owns authoritative state: its `state` and `attributes` are
//! the last [`ProjectedState`] computed from the characteristic mirror, plus
//! availability.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::Timestamp;
use crate::error::{BridgeError, ValidationError};
use crate::id::{Iid, ServiceRef};
use crate::projection::{ProjectedState, SwitchKind};

/// Discrete operational state of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityState {
    On,
    Off,
    #[default]
    Unknown,
    Unavailable,
}

impl EntityState {
    /// Whether the entity is reachable (anything but [`Unavailable`](Self::Unavailable)).
    #[must_use]
    pub fn is_available(self) -> bool {
        !matches!(self, Self::Unavailable)
    }

    #[must_use]
    pub fn from_on(is_on: bool) -> Self {
        if is_on { Self::On } else { Self::Off }
    }
}

impl std::fmt::Display for EntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::On => f.write_str("on"),
            Self::Off => f.write_str("off"),
            Self::Unknown => f.write_str("unknown"),
            Self::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// Attribute map; ordered so snapshots compare and serialize deterministically.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A switch entity bound to one service of one accessory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    /// Hub entity id, e.g. `switch.testdevice`.
    pub entity_id: String,
    /// Canonical unique id, `{mac}_{aid}_{sid}[_{cid}]`.
    pub unique_id: String,
    pub friendly_name: String,
    pub service: ServiceRef,
    /// Characteristic instance id for characteristic switches.
    pub cid: Option<Iid>,
    #[serde(skip)]
    pub kind: SwitchKind,
    pub state: EntityState,
    pub attributes: Attributes,
    pub last_changed: Timestamp,
    pub last_updated: Timestamp,
}

impl Entity {
    /// Create a builder for constructing an [`Entity`].
    #[must_use]
    pub fn builder() -> EntityBuilder {
        EntityBuilder::default()
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

    /// Look up an attribute by key.
    #[must_use]
    pub fn get_attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Whether the entity currently reports `on`.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.state == EntityState::On
    }

    /// Update the state, bumping `last_changed` only when it actually changes.
    pub fn update_state(&mut self, new_state: EntityState, timestamp: Timestamp) {
        if self.state != new_state {
            self.last_changed = timestamp;
        }
        self.state = new_state;
        self.last_updated = timestamp;
    }

    /// Publish a fresh projection. Returns `true` when state or attributes changed.
    pub fn apply_projection(&mut self, projected: ProjectedState, timestamp: Timestamp) -> bool {
        let new_state = projected.entity_state();
        let changed = self.state != new_state || self.attributes != projected.attributes;
        self.attributes = projected.attributes;
        self.update_state(new_state, timestamp);
        changed
    }

    /// Flag the entity unavailable, keeping the last known attributes.
    /// Returns `true` when this changed the state.
    pub fn mark_unavailable(&mut self, timestamp: Timestamp) -> bool {
        let changed = self.state.is_available();
        self.update_state(EntityState::Unavailable, timestamp);
        changed
    }
}

/// Step-by-step builder for [`Entity`].
#[derive(Debug, Default)]
pub struct EntityBuilder {
    entity_id: Option<String>,
    unique_id: Option<String>,
    friendly_name: Option<String>,
    service: Option<ServiceRef>,
    cid: Option<Iid>,
    kind: Option<SwitchKind>,
    state: Option<EntityState>,
    attributes: Attributes,
}

impl EntityBuilder {
    #[must_use]
    pub fn entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    #[must_use]
    pub fn unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    #[must_use]
    pub fn friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn service(mut self, service: ServiceRef) -> Self {
        self.service = Some(service);
        self
    }

    #[must_use]
    pub fn cid(mut self, cid: Iid) -> Self {
        self.cid = Some(cid);
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: SwitchKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn state(mut self, state: EntityState) -> Self {
        self.state = Some(state);
        self
    }

    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Consume the builder, validate, and return an [`Entity`].
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Validation`] if `entity_id` or `unique_id` is
    /// missing or empty.
    pub fn build(self) -> Result<Entity, BridgeError> {
        let ts = Utc::now();
        let entity = Entity {
            entity_id: self.entity_id.unwrap_or_default(),
            unique_id: self.unique_id.unwrap_or_default(),
            friendly_name: self.friendly_name.unwrap_or_default(),
            service: self.service.unwrap_or_else(|| ServiceRef::new(0, 0)),
            cid: self.cid,
            kind: self.kind.unwrap_or(SwitchKind::Outlet),
            state: self.state.unwrap_or_default(),
            attributes: self.attributes,
            last_changed: ts,
            last_updated: ts,
        };
        entity.validate()?;
        Ok(entity)
    }
}
