//! Virtual outlet: `ON` plus the read-only `OUTLET_IN_USE` flag.

use hkbridge_domain::accessory::{Accessory, AccessoryInfo};
use hkbridge_domain::characteristic::CharacteristicType;
use hkbridge_domain::id::Aid;
use hkbridge_domain::service::ServiceType;

#[must_use]
pub fn outlet(aid: Aid, name: &str) -> Accessory {
    let info = AccessoryInfo {
        manufacturer: "hkbridge".to_string(),
        model: "VOutlet-1".to_string(),
        ..AccessoryInfo::named(name)
    };
    let mut accessory = Accessory::with_information(aid, &info);
    let mut service = accessory.add_service(ServiceType::Outlet);
    service.add_char(CharacteristicType::On);
    service.add_char(CharacteristicType::OutletInUse);
    accessory
}
