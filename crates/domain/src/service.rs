//! Services: typed groups of characteristics on an accessory.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::characteristic::{Characteristic, CharacteristicType, CharacteristicValue};
use crate::error::ValidationError;
use crate::id::{Iid, ServiceRef};

/// A batch of characteristic values addressed by type within one service.
pub type CharacteristicUpdates = BTreeMap<CharacteristicType, CharacteristicValue>;

/// Service types known to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    AccessoryInformation,
    Outlet,
    Faucet,
    Valve,
    Switch,
}

impl ServiceType {
    /// Characteristic types that carry meaning for this service type.
    #[must_use]
    pub fn relevant_characteristics(self) -> &'static [CharacteristicType] {
        use CharacteristicType as C;
        match self {
            Self::AccessoryInformation => &[
                C::Identify,
                C::Manufacturer,
                C::Model,
                C::Name,
                C::SerialNumber,
                C::FirmwareRevision,
            ],
            Self::Outlet => &[C::On, C::OutletInUse],
            Self::Faucet => &[C::Active],
            Self::Valve => &[
                C::Active,
                C::InUse,
                C::IsConfigured,
                C::RemainingDuration,
                C::SetDuration,
                C::ValveType,
            ],
            Self::Switch => &[C::On],
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AccessoryInformation => "accessory_information",
            Self::Outlet => "outlet",
            Self::Faucet => "faucet",
            Self::Valve => "valve",
            Self::Switch => "switch",
        };
        f.write_str(name)
    }
}

/// A service and the characteristics it owns, keyed by type.
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub iid: Iid,
    pub service_type: ServiceType,
    characteristics: BTreeMap<CharacteristicType, Characteristic>,
}

impl Service {
    #[must_use]
    pub fn new(iid: Iid, service_type: ServiceType) -> Self {
        Self {
            iid,
            service_type,
            characteristics: BTreeMap::new(),
        }
    }

    /// Insert (or replace) a characteristic.
    pub fn insert(&mut self, characteristic: Characteristic) -> &mut Characteristic {
        match self.characteristics.entry(characteristic.char_type) {
            Entry::Occupied(mut slot) => {
                slot.insert(characteristic);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(characteristic),
        }
    }

    #[must_use]
    pub fn get(&self, char_type: CharacteristicType) -> Option<&Characteristic> {
        self.characteristics.get(&char_type)
    }

    pub fn get_mut(&mut self, char_type: CharacteristicType) -> Option<&mut Characteristic> {
        self.characteristics.get_mut(&char_type)
    }

    /// Current value of a characteristic, if the service has it.
    #[must_use]
    pub fn value(&self, char_type: CharacteristicType) -> Option<&CharacteristicValue> {
        self.get(char_type).map(|c| &c.value)
    }

    #[must_use]
    pub fn has(&self, char_type: CharacteristicType) -> bool {
        self.characteristics.contains_key(&char_type)
    }

    /// Look a characteristic up by instance id.
    #[must_use]
    pub fn find_by_iid(&self, iid: Iid) -> Option<&Characteristic> {
        self.characteristics.values().find(|c| c.iid == iid)
    }

    pub fn characteristics(&self) -> impl Iterator<Item = &Characteristic> {
        self.characteristics.values()
    }

    pub fn characteristics_mut(&mut self) -> impl Iterator<Item = &mut Characteristic> {
        self.characteristics.values_mut()
    }

    /// Validate a whole batch without touching the service.
    ///
    /// Returns the batch with every value in its canonical form.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found: a type the service does
    /// not have, or a value outside its characteristic's domain.
    pub fn validate_updates(
        &self,
        service_ref: ServiceRef,
        updates: &CharacteristicUpdates,
    ) -> Result<CharacteristicUpdates, ValidationError> {
        updates
            .iter()
            .map(|(char_type, value)| {
                let characteristic =
                    self.get(*char_type)
                        .ok_or(ValidationError::UnknownCharacteristic {
                            service: service_ref,
                            characteristic: *char_type,
                        })?;
                Ok((*char_type, characteristic.validate(value)?))
            })
            .collect()
    }
}
