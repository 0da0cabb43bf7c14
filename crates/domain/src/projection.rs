//! Projection rules: characteristic values → switch entity state.
//!
//! Every switch flavour is a [`SwitchKind`] variant paired with one pure
//! projection function. Absent characteristics project to their type default:
//!
//! | kind | `is_on` | attributes |
//! |------|---------|------------|
//! | Outlet | `ON` (false) | `outlet_in_use` = `OUTLET_IN_USE` (false) |
//! | Faucet | `ACTIVE` (inactive) | none |
//! | Valve | `ACTIVE` (inactive) | `in_use` (false), `is_configured` (false), `remaining_duration` (omitted) |
//! | Characteristic(t) | `t` (false) | none |

use crate::characteristic::{
    ActiveValues, CharacteristicType, CharacteristicValue, InUseValues, IsConfiguredValues,
};
use crate::entity::{AttributeValue, Attributes, EntityState};
use crate::service::Service;

pub const ATTR_OUTLET_IN_USE: &str = "outlet_in_use";
pub const ATTR_IN_USE: &str = "in_use";
pub const ATTR_IS_CONFIGURED: &str = "is_configured";
pub const ATTR_REMAINING_DURATION: &str = "remaining_duration";

/// Flavour of switch entity, deciding projection and command encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchKind {
    Outlet,
    Faucet,
    Valve,
    /// A single boolean characteristic exposed as a switch, whatever
    /// service hosts it.
    Characteristic(CharacteristicType),
}

impl SwitchKind {
    /// Characteristic written by `turn_on` / `turn_off`.
    #[must_use]
    pub fn command_characteristic(self) -> CharacteristicType {
        match self {
            Self::Outlet => CharacteristicType::On,
            Self::Faucet | Self::Valve => CharacteristicType::Active,
            Self::Characteristic(char_type) => char_type,
        }
    }

    /// Wire value written for the requested on/off state.
    #[must_use]
    pub fn command_value(self, on: bool) -> CharacteristicValue {
        match self {
            Self::Outlet | Self::Characteristic(_) => CharacteristicValue::Bool(on),
            Self::Faucet | Self::Valve => {
                let active = if on {
                    ActiveValues::Active
                } else {
                    ActiveValues::Inactive
                };
                active.into()
            }
        }
    }

    /// Whether a change of `char_type` can alter this kind's projection.
    #[must_use]
    pub fn depends_on(self, char_type: CharacteristicType) -> bool {
        use CharacteristicType as C;
        match self {
            Self::Outlet => matches!(char_type, C::On | C::OutletInUse),
            Self::Faucet => char_type == C::Active,
            Self::Valve => matches!(
                char_type,
                C::Active | C::InUse | C::IsConfigured | C::RemainingDuration
            ),
            Self::Characteristic(own) => own == char_type,
        }
    }
}

/// Entity-level view of one service: on/off plus named attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedState {
    pub is_on: bool,
    pub attributes: Attributes,
}

impl ProjectedState {
    #[must_use]
    pub fn entity_state(&self) -> EntityState {
        EntityState::from_on(self.is_on)
    }
}

/// Project `service` through the rules of `kind`.
#[must_use]
pub fn project(kind: SwitchKind, service: &Service) -> ProjectedState {
    match kind {
        SwitchKind::Outlet => project_outlet(service),
        SwitchKind::Faucet => project_faucet(service),
        SwitchKind::Valve => project_valve(service),
        SwitchKind::Characteristic(char_type) => project_characteristic(service, char_type),
    }
}

fn project_outlet(service: &Service) -> ProjectedState {
    let mut attributes = Attributes::new();
    attributes.insert(
        ATTR_OUTLET_IN_USE.to_string(),
        AttributeValue::Bool(read_bool(service, CharacteristicType::OutletInUse)),
    );
    ProjectedState {
        is_on: read_bool(service, CharacteristicType::On),
        attributes,
    }
}

fn project_faucet(service: &Service) -> ProjectedState {
    ProjectedState {
        is_on: read_bool(service, CharacteristicType::Active),
        attributes: Attributes::new(),
    }
}

fn project_valve(service: &Service) -> ProjectedState {
    let mut attributes = Attributes::new();
    attributes.insert(
        ATTR_IN_USE.to_string(),
        AttributeValue::Bool(
            read_int(service, CharacteristicType::InUse) == Some(InUseValues::InUse as i64),
        ),
    );
    attributes.insert(
        ATTR_IS_CONFIGURED.to_string(),
        AttributeValue::Bool(
            read_int(service, CharacteristicType::IsConfigured)
                == Some(IsConfiguredValues::Configured as i64),
        ),
    );
    if let Some(remaining) = read_int(service, CharacteristicType::RemainingDuration) {
        attributes.insert(
            ATTR_REMAINING_DURATION.to_string(),
            AttributeValue::Int(remaining),
        );
    }
    ProjectedState {
        is_on: read_bool(service, CharacteristicType::Active),
        attributes,
    }
}

fn project_characteristic(service: &Service, char_type: CharacteristicType) -> ProjectedState {
    ProjectedState {
        is_on: read_bool(service, char_type),
        attributes: Attributes::new(),
    }
}

fn read_bool(service: &Service, char_type: CharacteristicType) -> bool {
    service
        .value(char_type)
        .and_then(CharacteristicValue::as_bool)
        .unwrap_or(false)
}

fn read_int(service: &Service, char_type: CharacteristicType) -> Option<i64> {
    service.value(char_type).and_then(CharacteristicValue::as_int)
}
