//! Update reconciler: merges accessory data into the store and re-projects
//! the entities bound to the touched services.
//!
//! All mutations of one accessory go through its [`AccessoryWriter`], so
//! merges, re-projection and the resulting events are serialised per
//! accessory. Network calls are made without holding the writer.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;

use hkbridge_domain::accessory::Accessory;
use hkbridge_domain::entity::{Entity, EntityState};
use hkbridge_domain::error::{BridgeError, NotFoundError, TransportError, ValidationError};
use hkbridge_domain::event::{Event, EventType};
use hkbridge_domain::id::{Aid, Iid, MacAddress, ServiceRef};
use hkbridge_domain::projection::project;
use hkbridge_domain::service::CharacteristicUpdates;

use crate::ports::{
    AccessoryDirectory, AccessoryTransport, CharacteristicReading, CharacteristicWrite,
    EventPublisher,
};
use crate::store::{AccessoryStore, AccessoryWriter};

/// Transport and availability tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Upper bound of a single transport call.
    pub command_timeout: Duration,
    /// Extra attempts after a transient transport failure.
    pub command_retries: u32,
    /// Delay before the first retry, doubled on each following one.
    pub retry_backoff: Duration,
    /// Consecutive failed transport calls before an accessory's entities are
    /// marked unavailable.
    pub unavailable_after: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(10),
            command_retries: 2,
            retry_backoff: Duration::from_millis(500),
            unavailable_after: 3,
        }
    }
}

#[derive(Default)]
struct EntityIndex {
    by_id: HashMap<String, Entity>,
    by_service: HashMap<ServiceRef, Vec<String>>,
}

#[derive(Debug, Default)]
struct Health {
    failures: u32,
    unavailable: bool,
}

/// Mirror of the paired accessories and the switch entities projected from it.
pub struct Reconciler<T, P> {
    store: AccessoryStore,
    transport: T,
    publisher: P,
    config: ReconcilerConfig,
    entities: RwLock<EntityIndex>,
    macs: RwLock<HashMap<Aid, MacAddress>>,
    health: Mutex<HashMap<Aid, Health>>,
}

impl<T, P> Reconciler<T, P> {
    pub fn new(transport: T, publisher: P, config: ReconcilerConfig) -> Self {
        Self {
            store: AccessoryStore::new(),
            transport,
            publisher,
            config,
            entities: RwLock::new(EntityIndex::default()),
            macs: RwLock::new(HashMap::new()),
            health: Mutex::new(HashMap::new()),
        }
    }

    /// Start mirroring `accessory`, observed on the pairing `mac`.
    pub fn add_accessory(&self, mac: MacAddress, accessory: Accessory) -> Arc<Accessory> {
        let aid = accessory.aid;
        tracing::debug!(%aid, %mac, services = accessory.services().len(), "accessory observed");
        self.macs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(aid, mac);
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(aid, Health::default());
        self.store.insert(accessory)
    }

    /// Current snapshot of accessory `aid`.
    #[must_use]
    pub fn accessory(&self, aid: Aid) -> Option<Arc<Accessory>> {
        self.store.snapshot(aid)
    }

    #[must_use]
    pub fn aids(&self) -> Vec<Aid> {
        self.store.aids()
    }

    /// Published state of entity `entity_id`.
    #[must_use]
    pub fn entity(&self, entity_id: &str) -> Option<Entity> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .get(entity_id)
            .cloned()
    }

    /// Every bound entity, ordered by entity id.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self
            .entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .values()
            .cloned()
            .collect();
        entities.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        entities
    }

    /// Ids of the entities projected from `service`.
    #[must_use]
    pub fn entity_ids_for(&self, service: ServiceRef) -> Vec<String> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_service
            .get(&service)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether accessory `aid` is currently considered reachable.
    #[must_use]
    pub fn is_available(&self, aid: Aid) -> bool {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&aid)
            .is_none_or(|health| !health.unavailable)
    }

    /// Bind `entity` to its service and give it its first projection.
    ///
    /// Binding an entity id that is already bound replaces the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotFound`] when the entity's accessory or
    /// service is not mirrored.
    pub fn bind_entity(&self, mut entity: Entity) -> Result<Entity, BridgeError> {
        let accessory = self.store.snapshot(entity.service.aid).ok_or_else(|| NotFoundError {
            entity: "Accessory",
            id: entity.service.aid.to_string(),
        })?;
        let service = accessory.service(entity.service.sid).ok_or_else(|| NotFoundError {
            entity: "Service",
            id: entity.service.to_string(),
        })?;

        let ts = Utc::now();
        entity.apply_projection(project(entity.kind, service), ts);
        if !self.is_available(entity.service.aid) {
            entity.mark_unavailable(ts);
        }

        let mut index = self.entities.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = index.by_id.remove(&entity.entity_id) {
            if let Some(ids) = index.by_service.get_mut(&previous.service) {
                ids.retain(|id| id != &previous.entity_id);
            }
        }
        index
            .by_service
            .entry(entity.service)
            .or_default()
            .push(entity.entity_id.clone());
        index.by_id.insert(entity.entity_id.clone(), entity.clone());
        Ok(entity)
    }

    /// Re-project the entities of services `sids`, returning one
    /// `StateChanged` event per entity whose state or attributes moved.
    fn reproject(&self, accessory: &Accessory, sids: &[Iid]) -> Vec<Event> {
        let ts = Utc::now();
        let mut events = Vec::new();
        let mut index = self.entities.write().unwrap_or_else(PoisonError::into_inner);
        let EntityIndex { by_id, by_service } = &mut *index;
        for sid in sids {
            let Some(service) = accessory.service(*sid) else {
                continue;
            };
            let service_ref = accessory.service_ref(service);
            for entity_id in by_service.get(&service_ref).into_iter().flatten() {
                let Some(entity) = by_id.get_mut(entity_id) else {
                    continue;
                };
                let from = entity.state;
                if entity.apply_projection(project(entity.kind, service), ts) {
                    events.push(state_changed(entity, from));
                }
            }
        }
        events
    }

    fn mark_unavailable(&self, aid: Aid) -> Vec<Event> {
        let ts = Utc::now();
        let mut events = Vec::new();
        let mut index = self.entities.write().unwrap_or_else(PoisonError::into_inner);
        for entity in index.by_id.values_mut().filter(|e| e.service.aid == aid) {
            let from = entity.state;
            if entity.mark_unavailable(ts) {
                events.push(availability_changed(entity, false));
                events.push(state_changed(entity, from));
            }
        }
        events
    }

    fn availability_restored(&self, aid: Aid) -> Vec<Event> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .values()
            .filter(|e| e.service.aid == aid)
            .map(|e| availability_changed(e, true))
            .collect()
    }

    /// Reset the failure counter. Returns `true` if the accessory was
    /// unavailable until now.
    fn record_success(&self, aid: Aid) -> bool {
        let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = health.entry(aid).or_default();
        entry.failures = 0;
        std::mem::replace(&mut entry.unavailable, false)
    }

    /// Count a failure. Returns `true` if this failure made the accessory
    /// unavailable.
    fn record_failure(&self, aid: Aid) -> bool {
        let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = health.entry(aid).or_default();
        entry.failures = entry.failures.saturating_add(1);
        if entry.unavailable || entry.failures < self.config.unavailable_after {
            return false;
        }
        entry.unavailable = true;
        true
    }
}

impl<T, P> Reconciler<T, P>
where
    T: AccessoryTransport + Send + Sync,
    P: EventPublisher + Send + Sync,
{
    /// Fetch the accessory database of pairing `mac` and start mirroring
    /// every accessory in it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] when the database cannot be read.
    #[tracing::instrument(skip(self))]
    pub async fn discover(&self, mac: &MacAddress) -> Result<Vec<Aid>, BridgeError> {
        let accessories = self
            .call_with_retry(|| self.transport.list_accessories())
            .await?;
        let aids = accessories
            .into_iter()
            .map(|accessory| self.add_accessory(mac.clone(), accessory).aid)
            .collect::<Vec<_>>();
        tracing::info!(count = aids.len(), "accessories discovered");
        Ok(aids)
    }

    /// Merge a partial batch into service `service_ref`.
    ///
    /// Returns the ids of every entity bound to the service.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Validation`] if any value is invalid, in which
    /// case nothing is merged, and [`BridgeError::NotFound`] for an unknown
    /// accessory or service.
    #[tracing::instrument(skip(self, service_ref, updates), fields(service = %service_ref))]
    pub async fn apply_update(
        &self,
        service_ref: ServiceRef,
        updates: CharacteristicUpdates,
    ) -> Result<Vec<String>, BridgeError> {
        self.commit_and_project(service_ref.aid, &[service_ref.sid], |accessory| {
            accessory.merge(service_ref.sid, &updates)
        })
        .await?;
        Ok(self.entity_ids_for(service_ref))
    }

    /// Replace the whole value set of service `service_ref`; characteristics
    /// missing from `values` revert to their defaults.
    ///
    /// # Errors
    ///
    /// Same as [`Reconciler::apply_update`].
    #[tracing::instrument(skip(self, service_ref, values), fields(service = %service_ref))]
    pub async fn apply_full_snapshot(
        &self,
        service_ref: ServiceRef,
        values: CharacteristicUpdates,
    ) -> Result<Vec<String>, BridgeError> {
        self.commit_and_project(service_ref.aid, &[service_ref.sid], |accessory| {
            accessory.replace(service_ref.sid, &values)
        })
        .await?;
        Ok(self.entity_ids_for(service_ref))
    }

    /// Fully poll accessory `aid` and apply the readings as one snapshot per
    /// service. Services without any reading are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] when the poll fails (the mirror is
    /// then unchanged), or a validation error for readings outside their
    /// domain.
    #[tracing::instrument(skip(self))]
    pub async fn poll(&self, aid: Aid) -> Result<Vec<String>, BridgeError> {
        if self.store.snapshot(aid).is_none() {
            return Err(NotFoundError {
                entity: "Accessory",
                id: aid.to_string(),
            }
            .into());
        }

        let readings = match self
            .call_with_retry(|| self.transport.get_characteristics(aid))
            .await
        {
            Ok(readings) => readings,
            Err(err) => {
                self.handle_failure(aid, &err).await;
                return Err(err.into());
            }
        };

        let writer = self.store.writer(aid).await?;
        let grouped = group_readings(&writer.current(), &readings);
        let sids: Vec<Iid> = grouped.keys().copied().collect();
        self.commit_locked(&writer, &sids, |accessory| {
            for (sid, values) in &grouped {
                accessory.replace(*sid, values)?;
            }
            Ok(())
        })
        .await?;
        drop(writer);

        tracing::debug!(%aid, readings = readings.len(), "poll applied");
        let index = self.entities.read().unwrap_or_else(PoisonError::into_inner);
        Ok(sids
            .iter()
            .filter_map(|sid| index.by_service.get(&ServiceRef { aid, sid: *sid }))
            .flatten()
            .cloned()
            .collect())
    }

    /// Switch entity `entity_id` on or off.
    ///
    /// The command characteristic of the entity's kind is written through the
    /// transport; only the value the accessory acknowledges is merged into
    /// the mirror.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotFound`] for an unknown entity,
    /// [`BridgeError::Validation`] when the command characteristic is missing
    /// or not writable, and [`BridgeError::Transport`] when the write failed
    /// or was not acknowledged; the mirror is unchanged in every error case.
    #[tracing::instrument(skip(self))]
    pub async fn set_on(&self, entity_id: &str, on: bool) -> Result<Entity, BridgeError> {
        let entity = self.entity(entity_id).ok_or_else(|| NotFoundError {
            entity: "Entity",
            id: entity_id.to_string(),
        })?;
        let write = self.command_for(&entity, on)?;
        let aid = write.aid;

        let acks = match self
            .call_with_retry(|| self.transport.put_characteristics(vec![write.clone()]))
            .await
        {
            Ok(acks) => acks,
            Err(err) => {
                self.handle_failure(aid, &err).await;
                return Err(err.into());
            }
        };
        if !acks.iter().any(|ack| ack.aid == write.aid && ack.iid == write.iid) {
            let err = TransportError::NotAcknowledged {
                aid,
                iid: write.iid,
            };
            self.handle_failure(aid, &err).await;
            return Err(err.into());
        }

        let writer = self.store.writer(aid).await?;
        let grouped = group_readings(&writer.current(), &acks);
        let sids: Vec<Iid> = grouped.keys().copied().collect();
        self.commit_locked(&writer, &sids, |accessory| {
            for (sid, values) in &grouped {
                accessory.merge(*sid, values)?;
            }
            Ok(())
        })
        .await?;
        drop(writer);

        self.entity(entity_id).ok_or_else(|| {
            NotFoundError {
                entity: "Entity",
                id: entity_id.to_string(),
            }
            .into()
        })
    }

    fn command_for(&self, entity: &Entity, on: bool) -> Result<CharacteristicWrite, BridgeError> {
        let accessory = self.store.snapshot(entity.service.aid).ok_or_else(|| NotFoundError {
            entity: "Accessory",
            id: entity.service.aid.to_string(),
        })?;
        let service = accessory.service(entity.service.sid).ok_or_else(|| NotFoundError {
            entity: "Service",
            id: entity.service.to_string(),
        })?;

        let char_type = entity.kind.command_characteristic();
        let characteristic = match entity.cid {
            Some(cid) => service.find_by_iid(cid),
            None => service.get(char_type),
        }
        .ok_or(ValidationError::UnknownCharacteristic {
            service: entity.service,
            characteristic: char_type,
        })?;
        if !characteristic.is_writable() {
            return Err(ValidationError::NotWritable {
                characteristic: characteristic.char_type,
            }
            .into());
        }

        Ok(CharacteristicWrite {
            aid: entity.service.aid,
            iid: characteristic.iid,
            value: characteristic.validate(&entity.kind.command_value(on))?,
        })
    }

    async fn commit_and_project<F>(&self, aid: Aid, sids: &[Iid], change: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut Accessory) -> Result<(), BridgeError> + Send,
    {
        let writer = self.store.writer(aid).await?;
        self.commit_locked(&writer, sids, change).await
    }

    /// Commit `change`, re-project and publish while the writer is held, so
    /// events of one accessory leave in commit order.
    async fn commit_locked<F>(
        &self,
        writer: &AccessoryWriter,
        sids: &[Iid],
        change: F,
    ) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut Accessory) -> Result<(), BridgeError>,
    {
        let snapshot = writer.commit(change)?;
        let mut events = Vec::new();
        if self.record_success(snapshot.aid) {
            tracing::info!(aid = %snapshot.aid, "accessory available again");
            events.extend(self.availability_restored(snapshot.aid));
            let all: Vec<Iid> = snapshot.services().iter().map(|s| s.iid).collect();
            events.extend(self.reproject(&snapshot, &all));
        } else {
            events.extend(self.reproject(&snapshot, sids));
        }
        self.publish_all(events).await;
        Ok(())
    }

    async fn handle_failure(&self, aid: Aid, err: &TransportError) {
        tracing::warn!(%aid, %err, "transport call failed");
        if !self.record_failure(aid) {
            return;
        }
        tracing::warn!(%aid, "accessory marked unavailable");
        let Ok(writer) = self.store.writer(aid).await else {
            return;
        };
        let events = self.mark_unavailable(aid);
        self.publish_all(events).await;
        drop(writer);
    }

    async fn publish_all(&self, events: Vec<Event>) {
        for event in events {
            if let Err(err) = self.publisher.publish(event).await {
                tracing::warn!(%err, "failed to publish event");
            }
        }
    }

    /// Run `op` under the configured timeout, retrying transient failures
    /// with exponential backoff.
    async fn call_with_retry<R, F, Fut>(&self, op: F) -> Result<R, TransportError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<R, TransportError>>,
    {
        let timeout = self.config.command_timeout;
        let mut backoff = self.config.retry_backoff;
        let mut attempt = 0;
        loop {
            let result = tokio::time::timeout(timeout, op())
                .await
                .unwrap_or(Err(TransportError::Timeout(timeout)));
            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.config.command_retries => {
                    attempt += 1;
                    tracing::debug!(%err, attempt, ?backoff, "retrying transport call");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl<T, P> AccessoryDirectory for Reconciler<T, P> {
    fn mac_for(&self, aid: Aid) -> Option<MacAddress> {
        self.macs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&aid)
            .cloned()
    }

    fn serial_number_for(&self, aid: Aid) -> Option<String> {
        self.store
            .snapshot(aid)?
            .serial_number()
            .map(str::to_string)
    }
}

/// Sort readings of `accessory` into per-service batches. Readings for other
/// accessories or unknown instance ids are dropped.
fn group_readings(
    accessory: &Accessory,
    readings: &[CharacteristicReading],
) -> BTreeMap<Iid, CharacteristicUpdates> {
    let mut grouped: BTreeMap<Iid, CharacteristicUpdates> = BTreeMap::new();
    for reading in readings {
        if reading.aid != accessory.aid {
            tracing::debug!(aid = %reading.aid, "reading for another accessory ignored");
            continue;
        }
        match accessory.locate(reading.iid) {
            Some((service, characteristic)) => {
                grouped
                    .entry(service.iid)
                    .or_default()
                    .insert(characteristic.char_type, reading.value.clone());
            }
            None => {
                tracing::debug!(aid = %reading.aid, iid = %reading.iid, "reading for unknown iid ignored");
            }
        }
    }
    grouped
}

fn state_changed(entity: &Entity, from: EntityState) -> Event {
    Event::new(
        EventType::StateChanged,
        Some(entity.entity_id.clone()),
        serde_json::json!({
            "from": from,
            "to": entity.state,
            "attributes": entity.attributes,
        }),
    )
}

fn availability_changed(entity: &Entity, available: bool) -> Event {
    Event::new(
        EventType::AvailabilityChanged,
        Some(entity.entity_id.clone()),
        serde_json::json!({ "available": available }),
    )
}
