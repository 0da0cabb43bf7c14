//! In-memory port implementations and accessory fixtures shared by the unit
//! tests of this crate.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use hkbridge_domain::accessory::{Accessory, AccessoryInfo};
use hkbridge_domain::characteristic::{CharacteristicType, CharacteristicValue};
use hkbridge_domain::entity::Entity;
use hkbridge_domain::error::{BridgeError, NotFoundError, TransportError, ValidationError};
use hkbridge_domain::event::Event;
use hkbridge_domain::id::{Aid, Iid, MacAddress, RecordId, ServiceRef};
use hkbridge_domain::projection::SwitchKind;
use hkbridge_domain::registry::RegistryEntry;
use hkbridge_domain::service::{CharacteristicUpdates, ServiceType};

use crate::ports::{
    AccessoryTransport, CharacteristicReading, CharacteristicWrite, EntityRegistry,
    EventPublisher,
};
use crate::reconciler::Reconciler;

pub fn mac() -> MacAddress {
    "00:00:00:00:00:00".parse().unwrap()
}

pub fn updates(values: &[(CharacteristicType, CharacteristicValue)]) -> CharacteristicUpdates {
    values.iter().cloned().collect()
}

pub fn outlet_accessory(aid: u64) -> Accessory {
    let mut accessory = Accessory::with_information(Aid(aid), &AccessoryInfo::named("TestDevice"));
    let mut service = accessory.add_service(ServiceType::Outlet);
    service.add_char(CharacteristicType::On);
    service.add_char(CharacteristicType::OutletInUse);
    accessory
}

pub fn valve_accessory(aid: u64) -> Accessory {
    let mut accessory = Accessory::with_information(Aid(aid), &AccessoryInfo::named("TestDevice"));
    let mut service = accessory.add_service(ServiceType::Valve);
    service.add_char(CharacteristicType::Active);
    service.add_char(CharacteristicType::InUse);
    service.add_char(CharacteristicType::IsConfigured);
    service.add_char(CharacteristicType::RemainingDuration);
    accessory
}

/// Outlet hosting the Aqara pairing-mode characteristic at cid 9.
pub fn pairing_accessory(aid: u64) -> Accessory {
    let mut accessory = Accessory::with_information(Aid(aid), &AccessoryInfo::named("TestDevice"));
    let mut service = accessory.add_service(ServiceType::Outlet);
    service.add_char(CharacteristicType::VendorAqaraPairingMode);
    service.add_char(CharacteristicType::On);
    service.add_char(CharacteristicType::OutletInUse);
    accessory
}

pub fn bind<T, P>(
    reconciler: &Reconciler<T, P>,
    entity_id: &str,
    service: ServiceRef,
    cid: Option<Iid>,
    kind: SwitchKind,
) -> Entity {
    let mut builder = Entity::builder()
        .entity_id(entity_id)
        .unique_id(format!("00:00:00:00:00:00_{}_{}", service.aid, service.sid))
        .friendly_name("TestDevice")
        .service(service)
        .kind(kind);
    if let Some(cid) = cid {
        builder = builder.cid(cid);
    }
    reconciler.bind_entity(builder.build().unwrap()).unwrap()
}

#[derive(Default)]
struct FakeState {
    accessories: BTreeMap<Aid, Accessory>,
    writes: Vec<CharacteristicWrite>,
    attempts: u32,
    failures_left: u32,
    latency: Option<Duration>,
    withhold_acks: bool,
}

/// Transport answering from in-memory accessories, with injectable failures
/// and latency.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<FakeState>,
}

impl FakeTransport {
    pub fn add(&self, accessory: Accessory) {
        self.state
            .lock()
            .unwrap()
            .accessories
            .insert(accessory.aid, accessory);
    }

    pub fn fail_next(&self, count: u32) {
        self.state.lock().unwrap().failures_left = count;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().unwrap().latency = Some(latency);
    }

    /// Apply writes but answer with an empty acknowledgement list.
    pub fn withhold_acks(&self, withhold: bool) {
        self.state.lock().unwrap().withhold_acks = withhold;
    }

    pub fn set_value(&self, aid: Aid, iid: Iid, value: CharacteristicValue) {
        let mut state = self.state.lock().unwrap();
        let accessory = state.accessories.get_mut(&aid).unwrap();
        write_value(accessory, iid, value).unwrap();
    }

    pub fn writes(&self) -> Vec<CharacteristicWrite> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn attempts(&self) -> u32 {
        self.state.lock().unwrap().attempts
    }

    async fn enter(&self, aid: Aid) -> Result<(), TransportError> {
        let (latency, fail) = {
            let mut state = self.state.lock().unwrap();
            state.attempts += 1;
            let fail = state.failures_left > 0;
            if fail {
                state.failures_left -= 1;
            }
            (state.latency, fail)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(TransportError::Unreachable(aid));
        }
        Ok(())
    }
}

fn write_value(accessory: &mut Accessory, iid: Iid, value: CharacteristicValue) -> Option<()> {
    let (sid, char_type) = accessory
        .locate(iid)
        .map(|(service, characteristic)| (service.iid, characteristic.char_type))?;
    let characteristic = accessory.service_mut(sid)?.get_mut(char_type)?;
    characteristic.value = value;
    Some(())
}

impl AccessoryTransport for FakeTransport {
    async fn list_accessories(&self) -> Result<Vec<Accessory>, TransportError> {
        Ok(self.state.lock().unwrap().accessories.values().cloned().collect())
    }

    async fn put_characteristics(
        &self,
        writes: Vec<CharacteristicWrite>,
    ) -> Result<Vec<CharacteristicReading>, TransportError> {
        let Some(first) = writes.first() else {
            return Ok(Vec::new());
        };
        self.enter(first.aid).await?;

        let mut state = self.state.lock().unwrap();
        let mut acks = Vec::new();
        for write in writes {
            let accessory = state
                .accessories
                .get_mut(&write.aid)
                .ok_or(TransportError::Unreachable(write.aid))?;
            write_value(accessory, write.iid, write.value.clone()).ok_or(
                TransportError::Rejected {
                    aid: write.aid,
                    iid: write.iid,
                    status: -70409,
                },
            )?;
            acks.push(CharacteristicReading {
                aid: write.aid,
                iid: write.iid,
                value: write.value.clone(),
            });
            state.writes.push(write);
        }
        if state.withhold_acks {
            acks.clear();
        }
        Ok(acks)
    }

    async fn get_characteristics(
        &self,
        aid: Aid,
    ) -> Result<Vec<CharacteristicReading>, TransportError> {
        self.enter(aid).await?;

        let state = self.state.lock().unwrap();
        let accessory = state
            .accessories
            .get(&aid)
            .ok_or(TransportError::Unreachable(aid))?;
        Ok(accessory
            .services()
            .iter()
            .flat_map(|service| service.characteristics())
            .filter(|characteristic| characteristic.is_readable())
            .map(|characteristic| CharacteristicReading {
                aid,
                iid: characteristic.iid,
                value: characteristic.value.clone(),
            })
            .collect())
    }
}

/// Publisher keeping every event for later inspection.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<Event>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: Event) -> Result<(), BridgeError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Registry keeping records in a vector.
#[derive(Default)]
pub struct InMemoryRegistry {
    entries: Mutex<Vec<RegistryEntry>>,
}

impl InMemoryRegistry {
    pub fn with_entries(entries: Vec<RegistryEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn entries(&self) -> Vec<RegistryEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl EntityRegistry for InMemoryRegistry {
    async fn get_or_create(&self, entry: RegistryEntry) -> Result<RegistryEntry, BridgeError> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries
            .iter()
            .find(|e| e.platform == entry.platform && e.unique_id == entry.unique_id)
        {
            return Ok(existing.clone());
        }
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn find_by_unique_id(
        &self,
        platform: &str,
        unique_id: &str,
    ) -> Result<Option<RegistryEntry>, BridgeError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.platform == platform && e.unique_id == unique_id)
            .cloned())
    }

    async fn get_by_entity_id(&self, entity_id: &str) -> Result<Option<RegistryEntry>, BridgeError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.entity_id == entity_id)
            .cloned())
    }

    async fn list_by_platform(&self, platform: &str) -> Result<Vec<RegistryEntry>, BridgeError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.platform == platform)
            .cloned()
            .collect())
    }

    async fn update_unique_id(
        &self,
        id: RecordId,
        unique_id: &str,
    ) -> Result<RegistryEntry, BridgeError> {
        let mut entries = self.entries.lock().unwrap();
        let platform = entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.platform.clone())
            .ok_or_else(|| NotFoundError {
                entity: "RegistryEntry",
                id: id.to_string(),
            })?;
        if entries
            .iter()
            .any(|e| e.id != id && e.platform == platform && e.unique_id == unique_id)
        {
            return Err(ValidationError::DuplicateUniqueId(unique_id.to_string()).into());
        }
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| NotFoundError {
                entity: "RegistryEntry",
                id: id.to_string(),
            })?;
        entry.rename_unique_id(unique_id);
        Ok(entry.clone())
    }
}
