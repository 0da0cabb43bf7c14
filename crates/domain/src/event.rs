//! Event: an immutable record of something that happened.
//!
//! Events are produced when an entity's projected state changes, when it
//! becomes (un)available, and when a registry record is migrated to the
//! canonical unique id.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::Timestamp;
use crate::id::EventId;

/// What kind of thing happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StateChanged,
    AvailabilityChanged,
    UniqueIdMigrated,
}

impl EventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StateChanged => "state_changed",
            Self::AvailabilityChanged => "availability_changed",
            Self::UniqueIdMigrated => "unique_id_migrated",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    /// Hub entity id the event is about, when there is one.
    pub entity_id: Option<String>,
    pub data: serde_json::Value,
    pub timestamp: Timestamp,
}

impl Event {
    #[must_use]
    pub fn new(event_type: EventType, entity_id: Option<String>, data: serde_json::Value) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            entity_id,
            data,
            timestamp: Utc::now(),
        }
    }
}
