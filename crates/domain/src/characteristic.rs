//! Characteristics: single typed data points on a service.
//!
//! The characteristic vocabulary (types, enum value sets) is fixed by the
//! HomeKit accessory protocol and vendor extensions; only the subset the
//! bridge maps into entities, plus the accessory information block, is
//! modelled here.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::Iid;

/// Characteristic types known to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacteristicType {
    // Accessory information
    Identify,
    Manufacturer,
    Model,
    Name,
    SerialNumber,
    FirmwareRevision,

    // Switch-like services
    On,
    OutletInUse,
    Active,
    InUse,
    IsConfigured,
    RemainingDuration,
    SetDuration,
    ValveType,

    // Vendor extensions
    VendorAqaraPairingMode,
    VendorAqaraE1PairingMode,
}

impl CharacteristicType {
    /// Snake-case name, as used in logs and serialized payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identify => "identify",
            Self::Manufacturer => "manufacturer",
            Self::Model => "model",
            Self::Name => "name",
            Self::SerialNumber => "serial_number",
            Self::FirmwareRevision => "firmware_revision",
            Self::On => "on",
            Self::OutletInUse => "outlet_in_use",
            Self::Active => "active",
            Self::InUse => "in_use",
            Self::IsConfigured => "is_configured",
            Self::RemainingDuration => "remaining_duration",
            Self::SetDuration => "set_duration",
            Self::ValveType => "valve_type",
            Self::VendorAqaraPairingMode => "vendor_aqara_pairing_mode",
            Self::VendorAqaraE1PairingMode => "vendor_aqara_e1_pairing_mode",
        }
    }

    /// Value domain declared by the protocol for this type.
    #[must_use]
    pub fn domain(self) -> ValueDomain {
        match self {
            Self::Manufacturer
            | Self::Model
            | Self::Name
            | Self::SerialNumber
            | Self::FirmwareRevision => ValueDomain::Text,
            Self::Identify
            | Self::On
            | Self::OutletInUse
            | Self::VendorAqaraPairingMode
            | Self::VendorAqaraE1PairingMode => ValueDomain::Bool,
            Self::Active => ValueDomain::Enum(ActiveValues::ALL),
            Self::InUse => ValueDomain::Enum(InUseValues::ALL),
            Self::IsConfigured => ValueDomain::Enum(IsConfiguredValues::ALL),
            Self::ValveType => ValueDomain::Enum(&[0, 1, 2, 3]),
            Self::RemainingDuration | Self::SetDuration => ValueDomain::Integer { min: 0, max: 3600 },
        }
    }

    /// Permissions a freshly created characteristic of this type carries.
    #[must_use]
    pub fn default_permissions(self) -> Permissions {
        match self {
            Self::Identify => Permissions::PAIRED_WRITE,
            Self::Manufacturer
            | Self::Model
            | Self::Name
            | Self::SerialNumber
            | Self::FirmwareRevision => Permissions::PAIRED_READ,
            Self::OutletInUse | Self::InUse | Self::RemainingDuration | Self::ValveType => {
                Permissions::PAIRED_READ | Permissions::EVENTS
            }
            Self::On
            | Self::Active
            | Self::IsConfigured
            | Self::SetDuration
            | Self::VendorAqaraE1PairingMode => {
                Permissions::PAIRED_READ | Permissions::PAIRED_WRITE | Permissions::EVENTS
            }
            // Event notifications are opt-in for the vendor pairing switch.
            Self::VendorAqaraPairingMode => Permissions::PAIRED_READ | Permissions::PAIRED_WRITE,
        }
    }
}

impl fmt::Display for CharacteristicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single characteristic value as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CharacteristicValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl CharacteristicValue {
    /// Interpret the value as a boolean (non-zero integers are `true`).
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            Self::Float(_) | Self::String(_) => None,
        }
    }

    /// Interpret the value as an integer (booleans map to `0`/`1`).
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            #[allow(clippy::cast_possible_truncation)]
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Self::Float(_) | Self::String(_) => None,
        }
    }
}

impl fmt::Display for CharacteristicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => b.fmt(f),
            Self::Int(i) => i.fmt(f),
            Self::Float(x) => x.fmt(f),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for CharacteristicValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for CharacteristicValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for CharacteristicValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// The set of values a characteristic may hold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueDomain {
    Bool,
    Enum(&'static [i64]),
    Integer { min: i64, max: i64 },
    Text,
}

impl ValueDomain {
    /// Bring `value` into this domain's canonical representation.
    ///
    /// Booleans and `0`/`1` integers are interchangeable for boolean and
    /// two-state enum domains, since accessories report either.
    /// Returns `None` when the value does not belong to the domain.
    #[must_use]
    pub fn normalize(&self, value: &CharacteristicValue) -> Option<CharacteristicValue> {
        match (self, value) {
            (Self::Bool, CharacteristicValue::Bool(b)) => Some(CharacteristicValue::Bool(*b)),
            (Self::Bool, CharacteristicValue::Int(i @ (0 | 1))) => {
                Some(CharacteristicValue::Bool(*i == 1))
            }
            (Self::Enum(values), v) => {
                let i = v.as_int()?;
                values.contains(&i).then_some(CharacteristicValue::Int(i))
            }
            (Self::Integer { min, max }, CharacteristicValue::Int(_) | CharacteristicValue::Float(_)) => {
                let i = value.as_int()?;
                (*min..=*max).contains(&i).then_some(CharacteristicValue::Int(i))
            }
            (Self::Text, CharacteristicValue::String(s)) => Some(CharacteristicValue::String(s.clone())),
            _ => None,
        }
    }

    /// Value a characteristic of this domain holds before anything is reported.
    #[must_use]
    pub fn default_value(&self) -> CharacteristicValue {
        match self {
            Self::Bool => CharacteristicValue::Bool(false),
            Self::Enum(values) => CharacteristicValue::Int(values.first().copied().unwrap_or(0)),
            Self::Integer { min, .. } => CharacteristicValue::Int(*min),
            Self::Text => CharacteristicValue::String(String::new()),
        }
    }
}

bitflags::bitflags! {
    /// HAP characteristic permissions (`pr`, `pw`, `ev`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Permissions: u8 {
        const PAIRED_READ  = 0b001;
        const PAIRED_WRITE = 0b010;
        const EVENTS       = 0b100;
    }
}

/// `Active` characteristic values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum ActiveValues {
    Inactive = 0,
    Active = 1,
}

impl ActiveValues {
    pub const ALL: &'static [i64] = &[Self::Inactive as i64, Self::Active as i64];
}

/// `InUse` characteristic values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum InUseValues {
    NotInUse = 0,
    InUse = 1,
}

impl InUseValues {
    pub const ALL: &'static [i64] = &[Self::NotInUse as i64, Self::InUse as i64];
}

/// `IsConfigured` characteristic values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum IsConfiguredValues {
    NotConfigured = 0,
    Configured = 1,
}

impl IsConfiguredValues {
    pub const ALL: &'static [i64] = &[Self::NotConfigured as i64, Self::Configured as i64];
}

impl From<ActiveValues> for CharacteristicValue {
    fn from(value: ActiveValues) -> Self {
        Self::Int(value as i64)
    }
}

impl From<InUseValues> for CharacteristicValue {
    fn from(value: InUseValues) -> Self {
        Self::Int(value as i64)
    }
}

impl From<IsConfiguredValues> for CharacteristicValue {
    fn from(value: IsConfiguredValues) -> Self {
        Self::Int(value as i64)
    }
}

/// One characteristic as mirrored from the accessory.
#[derive(Debug, Clone, PartialEq)]
pub struct Characteristic {
    pub iid: Iid,
    pub char_type: CharacteristicType,
    pub value: CharacteristicValue,
    pub perms: Permissions,
    pub domain: ValueDomain,
}

impl Characteristic {
    /// A characteristic with the protocol's default domain, permissions and value.
    #[must_use]
    pub fn new(iid: Iid, char_type: CharacteristicType) -> Self {
        let domain = char_type.domain();
        Self {
            iid,
            char_type,
            value: domain.default_value(),
            perms: char_type.default_permissions(),
            domain,
        }
    }

    /// Check `value` against the declared domain and return its canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::OutOfDomain`] when the value does not belong
    /// to the domain.
    pub fn validate(&self, value: &CharacteristicValue) -> Result<CharacteristicValue, ValidationError> {
        self.domain
            .normalize(value)
            .ok_or_else(|| ValidationError::OutOfDomain {
                characteristic: self.char_type,
                value: value.clone(),
            })
    }

    /// Validate and store `value`, leaving the previous value on failure.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::OutOfDomain`] when the value does not belong
    /// to the domain.
    pub fn set_value(&mut self, value: impl Into<CharacteristicValue>) -> Result<(), ValidationError> {
        self.value = self.validate(&value.into())?;
        Ok(())
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.perms.contains(Permissions::PAIRED_WRITE)
    }

    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.perms.contains(Permissions::PAIRED_READ)
    }

    /// Restore the domain default value.
    pub fn reset(&mut self) {
        self.value = self.domain.default_value();
    }
}
