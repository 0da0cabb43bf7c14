//! Virtual faucet: a bare `ACTIVE` characteristic.

use hkbridge_domain::accessory::{Accessory, AccessoryInfo};
use hkbridge_domain::characteristic::CharacteristicType;
use hkbridge_domain::id::Aid;
use hkbridge_domain::service::ServiceType;

#[must_use]
pub fn faucet(aid: Aid, name: &str) -> Accessory {
    let info = AccessoryInfo {
        manufacturer: "hkbridge".to_string(),
        model: "VFaucet-1".to_string(),
        ..AccessoryInfo::named(name)
    };
    let mut accessory = Accessory::with_information(aid, &info);
    accessory
        .add_service(ServiceType::Faucet)
        .add_char(CharacteristicType::Active);
    accessory
}
