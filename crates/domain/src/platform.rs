//! Platform table: which services and characteristics become switch entities.
//!
//! The table is built once at startup and shared immutably; nothing mutates it
//! afterwards.

use std::collections::BTreeMap;

use crate::accessory::Accessory;
use crate::characteristic::CharacteristicType;
use crate::id::{Iid, MacAddress, ServiceRef};
use crate::projection::SwitchKind;
use crate::service::ServiceType;
use crate::unique_id::CanonicalId;

/// Registry domain used for every entity the table produces.
pub const SWITCH_DOMAIN: &str = "switch";

/// A vendor characteristic exposed as its own switch entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicSwitch {
    /// Appended to the accessory's entity id and name, e.g. `pairing_mode`.
    pub suffix: &'static str,
    pub name: &'static str,
}

/// One switch entity the accessory should expose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub service: ServiceRef,
    pub cid: Option<Iid>,
    pub kind: SwitchKind,
    pub suffix: Option<&'static str>,
    pub name_suffix: Option<&'static str>,
}

impl EntityDescriptor {
    /// Canonical unique id under pairing `mac`.
    #[must_use]
    pub fn unique_id(&self, mac: &MacAddress) -> CanonicalId {
        CanonicalId {
            mac: mac.clone(),
            aid: self.service.aid,
            sid: self.service.sid,
            cid: self.cid,
        }
    }
}

/// Immutable mapping of service and characteristic types to switch kinds.
#[derive(Debug, Clone, Default)]
pub struct PlatformTable {
    services: BTreeMap<ServiceType, SwitchKind>,
    characteristics: BTreeMap<CharacteristicType, CharacteristicSwitch>,
}

impl PlatformTable {
    #[must_use]
    pub fn builder() -> PlatformTableBuilder {
        PlatformTableBuilder::default()
    }

    /// The HomeKit switch platform: outlets, faucets, valves and the Aqara
    /// pairing-mode switches.
    #[must_use]
    pub fn homekit_switches() -> Self {
        Self::builder()
            .service(ServiceType::Outlet, SwitchKind::Outlet)
            .service(ServiceType::Faucet, SwitchKind::Faucet)
            .service(ServiceType::Valve, SwitchKind::Valve)
            .characteristic(
                CharacteristicType::VendorAqaraPairingMode,
                CharacteristicSwitch {
                    suffix: "pairing_mode",
                    name: "Pairing Mode",
                },
            )
            .characteristic(
                CharacteristicType::VendorAqaraE1PairingMode,
                CharacteristicSwitch {
                    suffix: "pairing_mode",
                    name: "Pairing Mode",
                },
            )
            .build()
    }

    #[must_use]
    pub fn service_kind(&self, service_type: ServiceType) -> Option<SwitchKind> {
        self.services.get(&service_type).copied()
    }

    #[must_use]
    pub fn characteristic_switch(&self, char_type: CharacteristicType) -> Option<&CharacteristicSwitch> {
        self.characteristics.get(&char_type)
    }

    /// Every switch entity `accessory` exposes, in service order.
    #[must_use]
    pub fn describe(&self, accessory: &Accessory) -> Vec<EntityDescriptor> {
        let mut descriptors = Vec::new();
        for service in accessory.services() {
            let service_ref = accessory.service_ref(service);
            if let Some(kind) = self.service_kind(service.service_type) {
                descriptors.push(EntityDescriptor {
                    service: service_ref,
                    cid: None,
                    kind,
                    suffix: None,
                    name_suffix: None,
                });
            }
            for characteristic in service.characteristics() {
                if let Some(switch) = self.characteristic_switch(characteristic.char_type) {
                    descriptors.push(EntityDescriptor {
                        service: service_ref,
                        cid: Some(characteristic.iid),
                        kind: SwitchKind::Characteristic(characteristic.char_type),
                        suffix: Some(switch.suffix),
                        name_suffix: Some(switch.name),
                    });
                }
            }
        }
        descriptors
    }
}

/// Builder for [`PlatformTable`]; the only way to populate one.
#[derive(Debug, Default)]
pub struct PlatformTableBuilder {
    table: PlatformTable,
}

impl PlatformTableBuilder {
    #[must_use]
    pub fn service(mut self, service_type: ServiceType, kind: SwitchKind) -> Self {
        self.table.services.insert(service_type, kind);
        self
    }

    #[must_use]
    pub fn characteristic(mut self, char_type: CharacteristicType, switch: CharacteristicSwitch) -> Self {
        self.table.characteristics.insert(char_type, switch);
        self
    }

    #[must_use]
    pub fn build(self) -> PlatformTable {
        self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessory::AccessoryInfo;
    use crate::id::Aid;

    #[test]
    fn should_describe_outlet_and_pairing_mode_switch() {
        let mut accessory = Accessory::with_information(Aid(4), &AccessoryInfo::named("TestDevice"));
        let mut outlet = accessory.add_service(ServiceType::Outlet);
        outlet.add_char(CharacteristicType::VendorAqaraPairingMode);

        let descriptors = PlatformTable::homekit_switches().describe(&accessory);

        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].kind, SwitchKind::Outlet);
        assert_eq!(descriptors[0].service, ServiceRef::new(4, 8));
        assert_eq!(descriptors[1].cid, Some(Iid(9)));
        assert_eq!(descriptors[1].suffix, Some("pairing_mode"));
    }

    #[test]
    fn should_ignore_information_service() {
        let accessory = Accessory::with_information(Aid(1), &AccessoryInfo::named("Bridge"));
        assert!(PlatformTable::homekit_switches().describe(&accessory).is_empty());
    }

    #[test]
    fn should_build_canonical_unique_ids() {
        let mac: MacAddress = "00:00:00:00:00:00".parse().unwrap();
        let descriptor = EntityDescriptor {
            service: ServiceRef::new(4, 8),
            cid: Some(Iid(9)),
            kind: SwitchKind::Characteristic(CharacteristicType::VendorAqaraPairingMode),
            suffix: Some("pairing_mode"),
            name_suffix: Some("Pairing Mode"),
        };
        assert_eq!(descriptor.unique_id(&mac).to_string(), "00:00:00:00:00:00_4_8_9");
    }

    #[test]
    fn should_describe_nothing_with_empty_table() {
        let mut accessory = Accessory::new(Aid(1));
        accessory.add_service(ServiceType::Outlet);
        assert!(PlatformTable::builder().build().describe(&accessory).is_empty());
    }
}
