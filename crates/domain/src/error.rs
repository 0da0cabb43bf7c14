//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`BridgeError`]
//! via `#[from]`, so port boundaries only ever speak one error type.

use std::time::Duration;

use crate::characteristic::{CharacteristicType, CharacteristicValue};
use crate::id::{Aid, Iid, ServiceRef};

/// Top-level error crossing port boundaries.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A value or record broke a domain invariant.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// A looked-up record does not exist.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// Talking to the physical accessory failed.
    #[error("transport error")]
    Transport(#[from] TransportError),

    /// The persistence layer failed.
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Domain invariant violations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("value {value} is outside the domain of {characteristic}")]
    OutOfDomain {
        characteristic: CharacteristicType,
        value: CharacteristicValue,
    },

    #[error("service {service} has no {characteristic} characteristic")]
    UnknownCharacteristic {
        service: ServiceRef,
        characteristic: CharacteristicType,
    },

    #[error("characteristic {characteristic} is not writable")]
    NotWritable { characteristic: CharacteristicType },

    #[error("invalid MAC address {0:?}")]
    InvalidMac(String),

    #[error("entity id must not be empty")]
    EmptyEntityId,

    #[error("unique id must not be empty")]
    EmptyUniqueId,

    #[error("unique id {0:?} is already registered")]
    DuplicateUniqueId(String),

    #[error("service call {0:?} is not supported by switches")]
    UnsupportedServiceCall(String),
}

/// A record addressed by id was not found.
#[derive(Debug, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// Failures of the accessory transport (pairing connection).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("accessory did not answer within {0:?}")]
    Timeout(Duration),

    #[error("accessory {0} is unreachable")]
    Unreachable(Aid),

    #[error("accessory {aid} rejected characteristic {iid} with status {status}")]
    Rejected { aid: Aid, iid: Iid, status: i32 },

    #[error("accessory {aid} answered without acknowledging characteristic {iid}")]
    NotAcknowledged { aid: Aid, iid: Iid },

    #[error("transport failure")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Whether retrying the same request may succeed. An accessory that
    /// answered, whether by rejecting the write or by leaving it out of its
    /// response, will not answer differently on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Rejected { .. } | Self::NotAcknowledged { .. })
    }
}
