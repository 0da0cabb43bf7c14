//! Accessory: a physical HomeKit device and its service graph.
//!
//! Instance ids are allocated sequentially per accessory, services and
//! characteristics sharing one counter, exactly like accessories number their
//! own attribute database. An accessory built with
//! [`Accessory::with_information`] therefore always places its first
//! functional service at sid 8 and that service's first characteristic at
//! cid 9.

use crate::characteristic::{Characteristic, CharacteristicType, CharacteristicValue};
use crate::error::{BridgeError, NotFoundError};
use crate::id::{Aid, Iid, ServiceRef};
use crate::service::{CharacteristicUpdates, Service, ServiceType};

/// Static identification data of an accessory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessoryInfo {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_revision: String,
}

impl AccessoryInfo {
    /// Info block with the given name and placeholder identification fields.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            manufacturer: "Unknown".to_string(),
            model: "Unknown".to_string(),
            serial_number: "0001".to_string(),
            firmware_revision: "1.0.0".to_string(),
        }
    }
}

/// An accessory with its services.
#[derive(Debug, Clone, PartialEq)]
pub struct Accessory {
    pub aid: Aid,
    services: Vec<Service>,
    next_iid: u64,
}

impl Accessory {
    /// An accessory without any service.
    #[must_use]
    pub fn new(aid: Aid) -> Self {
        Self {
            aid,
            services: Vec::new(),
            next_iid: 1,
        }
    }

    /// An accessory whose first service is the Accessory Information block.
    #[must_use]
    pub fn with_information(aid: Aid, info: &AccessoryInfo) -> Self {
        let mut accessory = Self::new(aid);
        let mut service = accessory.add_service(ServiceType::AccessoryInformation);
        service.add_char(CharacteristicType::Identify);
        for (char_type, text) in [
            (CharacteristicType::Manufacturer, &info.manufacturer),
            (CharacteristicType::Model, &info.model),
            (CharacteristicType::Name, &info.name),
            (CharacteristicType::SerialNumber, &info.serial_number),
            (CharacteristicType::FirmwareRevision, &info.firmware_revision),
        ] {
            service.add_char(char_type).value = CharacteristicValue::String(text.clone());
        }
        accessory
    }

    /// Append a service, allocating its instance id.
    pub fn add_service(&mut self, service_type: ServiceType) -> ServiceMut<'_> {
        let sid = Iid(self.next_iid);
        self.next_iid += 1;
        self.services.push(Service::new(sid, service_type));
        let index = self.services.len() - 1;
        ServiceMut {
            service: &mut self.services[index],
            next_iid: &mut self.next_iid,
        }
    }

    #[must_use]
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    #[must_use]
    pub fn service(&self, sid: Iid) -> Option<&Service> {
        self.services.iter().find(|s| s.iid == sid)
    }

    pub fn service_mut(&mut self, sid: Iid) -> Option<&mut Service> {
        self.services.iter_mut().find(|s| s.iid == sid)
    }

    /// First service of the given type.
    #[must_use]
    pub fn service_of_type(&self, service_type: ServiceType) -> Option<&Service> {
        self.services.iter().find(|s| s.service_type == service_type)
    }

    #[must_use]
    pub fn service_ref(&self, service: &Service) -> ServiceRef {
        ServiceRef {
            aid: self.aid,
            sid: service.iid,
        }
    }

    /// Find the service owning the characteristic with instance id `iid`.
    #[must_use]
    pub fn locate(&self, iid: Iid) -> Option<(&Service, &Characteristic)> {
        self.services
            .iter()
            .find_map(|s| s.find_by_iid(iid).map(|c| (s, c)))
    }

    /// Merge a partial batch into service `sid`.
    ///
    /// Every value is validated before any is written, so on error the
    /// accessory is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotFound`] for an unknown service and
    /// [`BridgeError::Validation`] for an unknown characteristic or a value
    /// outside its domain.
    pub fn merge(&mut self, sid: Iid, updates: &CharacteristicUpdates) -> Result<(), BridgeError> {
        let (service, validated) = self.validated(sid, updates)?;
        for (char_type, value) in validated {
            if let Some(characteristic) = service.get_mut(char_type) {
                characteristic.value = value;
            }
        }
        Ok(())
    }

    /// Replace the whole value set of service `sid`; characteristics absent
    /// from `values` revert to their domain default.
    ///
    /// # Errors
    ///
    /// Same as [`Accessory::merge`].
    pub fn replace(&mut self, sid: Iid, values: &CharacteristicUpdates) -> Result<(), BridgeError> {
        let (service, mut validated) = self.validated(sid, values)?;
        for characteristic in service.characteristics_mut() {
            match validated.remove(&characteristic.char_type) {
                Some(value) => characteristic.value = value,
                None => characteristic.reset(),
            }
        }
        Ok(())
    }

    fn validated(
        &mut self,
        sid: Iid,
        updates: &CharacteristicUpdates,
    ) -> Result<(&mut Service, CharacteristicUpdates), BridgeError> {
        let service_ref = ServiceRef { aid: self.aid, sid };
        let service = self.service_mut(sid).ok_or_else(|| NotFoundError {
            entity: "Service",
            id: service_ref.to_string(),
        })?;
        let validated = service.validate_updates(service_ref, updates)?;
        Ok((service, validated))
    }

    /// Display name from the information service.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.info_text(CharacteristicType::Name)
    }

    #[must_use]
    pub fn serial_number(&self) -> Option<&str> {
        self.info_text(CharacteristicType::SerialNumber)
    }

    fn info_text(&self, char_type: CharacteristicType) -> Option<&str> {
        match self
            .service_of_type(ServiceType::AccessoryInformation)?
            .value(char_type)?
        {
            CharacteristicValue::String(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }
}

/// Mutable handle on a freshly added service, sharing the accessory's iid counter.
pub struct ServiceMut<'a> {
    service: &'a mut Service,
    next_iid: &'a mut u64,
}

impl ServiceMut<'_> {
    #[must_use]
    pub fn sid(&self) -> Iid {
        self.service.iid
    }

    /// Add a characteristic with protocol defaults and the next instance id.
    pub fn add_char(&mut self, char_type: CharacteristicType) -> &mut Characteristic {
        let iid = Iid(*self.next_iid);
        *self.next_iid += 1;
        self.service.insert(Characteristic::new(iid, char_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outlet_accessory() -> Accessory {
        let mut accessory = Accessory::with_information(Aid(1), &AccessoryInfo::named("TestDevice"));
        let mut outlet = accessory.add_service(ServiceType::Outlet);
        outlet.add_char(CharacteristicType::On);
        outlet.add_char(CharacteristicType::OutletInUse);
        accessory
    }

    #[test]
    fn should_place_first_functional_service_at_sid_8() {
        let accessory = outlet_accessory();
        let outlet = accessory.service_of_type(ServiceType::Outlet).unwrap();
        assert_eq!(outlet.iid, Iid(8));
        assert_eq!(outlet.get(CharacteristicType::On).unwrap().iid, Iid(9));
        assert_eq!(outlet.get(CharacteristicType::OutletInUse).unwrap().iid, Iid(10));
    }

    #[test]
    fn should_expose_name_and_serial_from_information_service() {
        let accessory = outlet_accessory();
        assert_eq!(accessory.name(), Some("TestDevice"));
        assert_eq!(accessory.serial_number(), Some("0001"));
    }

    #[test]
    fn should_have_no_name_without_information_service() {
        let accessory = Accessory::new(Aid(2));
        assert_eq!(accessory.name(), None);
    }

    #[test]
    fn should_leave_other_characteristics_untouched_on_merge() {
        let mut accessory = outlet_accessory();
        let mut updates = CharacteristicUpdates::new();
        updates.insert(CharacteristicType::OutletInUse, true.into());
        accessory.merge(Iid(8), &updates).unwrap();

        let mut updates = CharacteristicUpdates::new();
        updates.insert(CharacteristicType::On, true.into());
        accessory.merge(Iid(8), &updates).unwrap();

        let outlet = accessory.service(Iid(8)).unwrap();
        assert_eq!(outlet.value(CharacteristicType::On), Some(&CharacteristicValue::Bool(true)));
        assert_eq!(
            outlet.value(CharacteristicType::OutletInUse),
            Some(&CharacteristicValue::Bool(true))
        );
    }

    #[test]
    fn should_keep_accessory_unchanged_when_merge_fails() {
        let mut accessory = outlet_accessory();
        let before = accessory.clone();
        let mut updates = CharacteristicUpdates::new();
        updates.insert(CharacteristicType::On, true.into());
        updates.insert(CharacteristicType::OutletInUse, CharacteristicValue::Int(3));

        let result = accessory.merge(Iid(8), &updates);
        assert!(matches!(result, Err(BridgeError::Validation(_))));
        assert_eq!(accessory, before);
    }

    #[test]
    fn should_reset_missing_characteristics_on_replace() {
        let mut accessory = outlet_accessory();
        let mut updates = CharacteristicUpdates::new();
        updates.insert(CharacteristicType::On, true.into());
        updates.insert(CharacteristicType::OutletInUse, true.into());
        accessory.merge(Iid(8), &updates).unwrap();

        let mut snapshot = CharacteristicUpdates::new();
        snapshot.insert(CharacteristicType::On, true.into());
        accessory.replace(Iid(8), &snapshot).unwrap();

        let outlet = accessory.service(Iid(8)).unwrap();
        assert_eq!(outlet.value(CharacteristicType::On), Some(&CharacteristicValue::Bool(true)));
        assert_eq!(
            outlet.value(CharacteristicType::OutletInUse),
            Some(&CharacteristicValue::Bool(false))
        );
    }

    #[test]
    fn should_report_unknown_service_as_not_found() {
        let mut accessory = outlet_accessory();
        let result = accessory.merge(Iid(42), &CharacteristicUpdates::new());
        assert!(matches!(result, Err(BridgeError::NotFound(_))));
    }

    #[test]
    fn should_locate_characteristic_across_services() {
        let accessory = outlet_accessory();
        let (service, characteristic) = accessory.locate(Iid(10)).unwrap();
        assert_eq!(service.service_type, ServiceType::Outlet);
        assert_eq!(characteristic.char_type, CharacteristicType::OutletInUse);
        assert!(accessory.locate(Iid(99)).is_none());
    }
}
