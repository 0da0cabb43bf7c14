//! Virtual Aqara hub: exposes the vendor pairing-mode characteristic.

use hkbridge_domain::accessory::{Accessory, AccessoryInfo};
use hkbridge_domain::characteristic::CharacteristicType;
use hkbridge_domain::id::Aid;
use hkbridge_domain::service::ServiceType;

/// Hub whose pairing switch sits at `sid` 8, `cid` 9, next to a plain
/// `ON` characteristic that is not exposed as an entity.
#[must_use]
pub fn aqara_hub(aid: Aid, name: &str) -> Accessory {
    let info = AccessoryInfo {
        manufacturer: "Aqara".to_string(),
        model: "ZHWG11LM".to_string(),
        ..AccessoryInfo::named(name)
    };
    let mut accessory = Accessory::with_information(aid, &info);
    let mut service = accessory.add_service(ServiceType::Switch);
    service.add_char(CharacteristicType::VendorAqaraPairingMode);
    service.add_char(CharacteristicType::On);
    accessory
}
