//! Virtual irrigation valve.
//!
//! Carries the full valve characteristic set so the projection has every
//! attribute to report, including a running `REMAINING_DURATION`.

use hkbridge_domain::accessory::{Accessory, AccessoryInfo};
use hkbridge_domain::characteristic::{CharacteristicType, CharacteristicValue, IsConfiguredValues};
use hkbridge_domain::id::Aid;
use hkbridge_domain::service::ServiceType;

/// `VALVE_TYPE` value for an irrigation valve.
const IRRIGATION: i64 = 1;

#[must_use]
pub fn valve(aid: Aid, name: &str) -> Accessory {
    let info = AccessoryInfo {
        manufacturer: "hkbridge".to_string(),
        model: "VValve-1".to_string(),
        ..AccessoryInfo::named(name)
    };
    let mut accessory = Accessory::with_information(aid, &info);
    let mut service = accessory.add_service(ServiceType::Valve);
    service.add_char(CharacteristicType::Active);
    service.add_char(CharacteristicType::InUse);
    service.add_char(CharacteristicType::IsConfigured).value = IsConfiguredValues::Configured.into();
    service.add_char(CharacteristicType::RemainingDuration);
    service.add_char(CharacteristicType::SetDuration).value = CharacteristicValue::Int(300);
    service.add_char(CharacteristicType::ValveType).value = CharacteristicValue::Int(IRRIGATION);
    accessory
}
