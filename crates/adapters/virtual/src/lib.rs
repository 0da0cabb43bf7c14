//! # hkbridge-adapter-virtual
//!
//! Virtual/demo transport that simulates one paired bridge for testing and
//! demonstration purposes.
//!
//! ## Provided accessories
//!
//! | aid | Accessory | Service at `sid` 8 | Exposed switch |
//! |-----|-----------|--------------------|----------------|
//! | 1 | Desk Outlet | Outlet | `ON` |
//! | 2 | Garden Faucet | Faucet | `ACTIVE` |
//! | 3 | Lawn Sprinkler | Valve | `ACTIVE` |
//! | 4 | Aqara Hub | Switch | vendor pairing mode (`cid` 9) |
//!
//! Physical changes are simulated with
//! [`VirtualAccessoryTransport::simulate_change`]; characteristics that
//! support events are pushed to the update pump, the others only show up on
//! the next poll. Failures and latency can be injected to exercise the
//! reconciler's retry and availability handling.
//!
//! ## Dependency rule
//!
//! Depends on `hkbridge-app` (port traits) and `hkbridge-domain` only.

pub mod devices;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use hkbridge_app::ports::{AccessoryTransport, CharacteristicReading, CharacteristicWrite};
use hkbridge_app::update_pump::InboundUpdate;
use hkbridge_domain::accessory::Accessory;
use hkbridge_domain::characteristic::{CharacteristicValue, Permissions};
use hkbridge_domain::error::{BridgeError, NotFoundError, TransportError};
use hkbridge_domain::id::{Aid, Iid, ServiceRef};
use hkbridge_domain::service::CharacteristicUpdates;

/// HAP status for a write to a read-only characteristic.
const STATUS_READ_ONLY: i32 = -70404;
/// HAP status for a value outside the characteristic's domain.
const STATUS_INVALID_VALUE: i32 = -70410;

#[derive(Default)]
struct State {
    accessories: BTreeMap<Aid, Accessory>,
    unreachable: BTreeSet<Aid>,
    failures_left: u32,
    latency: Option<Duration>,
}

/// Transport answering from in-memory accessories.
pub struct VirtualAccessoryTransport {
    state: Mutex<State>,
    events: Option<mpsc::Sender<InboundUpdate>>,
}

impl Default for VirtualAccessoryTransport {
    fn default() -> Self {
        Self::new(devices::demo_pairing())
    }
}

impl VirtualAccessoryTransport {
    #[must_use]
    pub fn new(accessories: Vec<Accessory>) -> Self {
        let accessories = accessories.into_iter().map(|a| (a.aid, a)).collect();
        Self {
            state: Mutex::new(State {
                accessories,
                ..State::default()
            }),
            events: None,
        }
    }

    /// Push event notifications into `sender`.
    #[must_use]
    pub fn with_events(mut self, sender: mpsc::Sender<InboundUpdate>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Fail the next `count` requests with [`TransportError::Unreachable`].
    pub fn fail_next(&self, count: u32) {
        self.lock().failures_left = count;
    }

    /// Delay every request by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Take accessory `aid` off the network, or bring it back.
    pub fn set_reachable(&self, aid: Aid, reachable: bool) {
        let mut state = self.lock();
        if reachable {
            state.unreachable.remove(&aid);
        } else {
            state.unreachable.insert(aid);
        }
    }

    /// Current value of characteristic `iid` on accessory `aid`.
    #[must_use]
    pub fn value(&self, aid: Aid, iid: Iid) -> Option<CharacteristicValue> {
        let state = self.lock();
        let accessory = state.accessories.get(&aid)?;
        accessory
            .locate(iid)
            .map(|(_, characteristic)| characteristic.value.clone())
    }

    /// Change a value on the accessory side, as a user pressing a physical
    /// button would, and notify subscribers when the characteristic supports
    /// events.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotFound`] for an unknown accessory or
    /// characteristic and [`BridgeError::Validation`] for a value outside
    /// its domain.
    pub async fn simulate_change(
        &self,
        aid: Aid,
        iid: Iid,
        value: CharacteristicValue,
    ) -> Result<(), BridgeError> {
        let notification = {
            let mut state = self.lock();
            let accessory = state.accessories.get_mut(&aid).ok_or_else(|| NotFoundError {
                entity: "Accessory",
                id: aid.to_string(),
            })?;
            let (sid, char_type, perms) = accessory
                .locate(iid)
                .map(|(service, characteristic)| {
                    (service.iid, characteristic.char_type, characteristic.perms)
                })
                .ok_or_else(|| NotFoundError {
                    entity: "Characteristic",
                    id: format!("{aid}.{iid}"),
                })?;
            let characteristic = accessory
                .service_mut(sid)
                .and_then(|service| service.get_mut(char_type))
                .ok_or_else(|| NotFoundError {
                    entity: "Characteristic",
                    id: format!("{aid}.{iid}"),
                })?;
            characteristic.set_value(value)?;
            tracing::debug!(%aid, %iid, %char_type, "simulated accessory change");

            perms.contains(Permissions::EVENTS).then(|| {
                let mut values = CharacteristicUpdates::new();
                values.insert(char_type, characteristic.value.clone());
                InboundUpdate::Partial {
                    service: ServiceRef { aid, sid },
                    values,
                }
            })
        };

        if let (Some(update), Some(sender)) = (notification, &self.events) {
            if sender.send(update).await.is_err() {
                tracing::debug!(%aid, "update pump closed, event dropped");
            }
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn enter(&self, aid: Aid) -> Result<(), TransportError> {
        let (latency, fail) = {
            let mut state = self.lock();
            let fail = state.failures_left > 0 || state.unreachable.contains(&aid);
            state.failures_left = state.failures_left.saturating_sub(1);
            (state.latency, fail)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if fail {
            tracing::debug!(%aid, "simulated transport failure");
            return Err(TransportError::Unreachable(aid));
        }
        Ok(())
    }
}

impl AccessoryTransport for VirtualAccessoryTransport {
    async fn list_accessories(&self) -> Result<Vec<Accessory>, TransportError> {
        Ok(self.lock().accessories.values().cloned().collect())
    }

    async fn put_characteristics(
        &self,
        writes: Vec<CharacteristicWrite>,
    ) -> Result<Vec<CharacteristicReading>, TransportError> {
        let Some(first) = writes.first() else {
            return Ok(Vec::new());
        };
        self.enter(first.aid).await?;

        let mut state = self.lock();
        let mut acks = Vec::with_capacity(writes.len());
        for write in writes {
            let accessory = state
                .accessories
                .get_mut(&write.aid)
                .ok_or(TransportError::Unreachable(write.aid))?;
            let rejected = |status| TransportError::Rejected {
                aid: write.aid,
                iid: write.iid,
                status,
            };
            let (sid, char_type) = accessory
                .locate(write.iid)
                .map(|(service, characteristic)| (service.iid, characteristic.char_type))
                .ok_or_else(|| rejected(STATUS_INVALID_VALUE))?;
            let characteristic = accessory
                .service_mut(sid)
                .and_then(|service| service.get_mut(char_type))
                .ok_or_else(|| rejected(STATUS_INVALID_VALUE))?;
            if !characteristic.is_writable() {
                return Err(rejected(STATUS_READ_ONLY));
            }
            characteristic
                .set_value(write.value.clone())
                .map_err(|_| rejected(STATUS_INVALID_VALUE))?;
            acks.push(CharacteristicReading {
                aid: write.aid,
                iid: write.iid,
                value: characteristic.value.clone(),
            });
        }
        Ok(acks)
    }

    async fn get_characteristics(
        &self,
        aid: Aid,
    ) -> Result<Vec<CharacteristicReading>, TransportError> {
        self.enter(aid).await?;

        let state = self.lock();
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

#[cfg(test)]
mod tests {
    use super::*;
    use hkbridge_domain::characteristic::{ActiveValues, CharacteristicType};

    #[tokio::test]
    async fn should_list_demo_pairing() {
        let transport = VirtualAccessoryTransport::default();
        let accessories = transport.list_accessories().await.unwrap();
        assert_eq!(accessories.len(), 4);
    }

    #[tokio::test]
    async fn should_acknowledge_writes() {
        let transport = VirtualAccessoryTransport::default();

        let acks = transport
            .put_characteristics(vec![CharacteristicWrite {
                aid: Aid(2),
                iid: Iid(9),
                value: ActiveValues::Active.into(),
            }])
            .await
            .unwrap();

        assert_eq!(acks.len(), 1);
        assert_eq!(transport.value(Aid(2), Iid(9)), Some(ActiveValues::Active.into()));
    }

    #[tokio::test]
    async fn should_reject_write_to_read_only_characteristic() {
        let transport = VirtualAccessoryTransport::default();

        let result = transport
            .put_characteristics(vec![CharacteristicWrite {
                aid: Aid(1),
                iid: Iid(10),
                value: true.into(),
            }])
            .await;

        assert!(matches!(
            result,
            Err(TransportError::Rejected { status: STATUS_READ_ONLY, .. })
        ));
        assert!(!result.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn should_fail_injected_requests_then_recover() {
        let transport = VirtualAccessoryTransport::default();
        transport.fail_next(1);

        assert!(matches!(
            transport.get_characteristics(Aid(1)).await,
            Err(TransportError::Unreachable(Aid(1)))
        ));
        assert!(transport.get_characteristics(Aid(1)).await.is_ok());
    }

    #[tokio::test]
    async fn should_stay_unreachable_until_brought_back() {
        let transport = VirtualAccessoryTransport::default();
        transport.set_reachable(Aid(3), false);

        assert!(transport.get_characteristics(Aid(3)).await.is_err());
        assert!(transport.get_characteristics(Aid(1)).await.is_ok());

        transport.set_reachable(Aid(3), true);
        assert!(transport.get_characteristics(Aid(3)).await.is_ok());
    }

    #[tokio::test]
    async fn should_push_event_for_evented_characteristic() {
        let (tx, mut rx) = mpsc::channel(4);
        let transport = VirtualAccessoryTransport::default().with_events(tx);

        transport
            .simulate_change(Aid(1), Iid(9), true.into())
            .await
            .unwrap();

        let update = rx.recv().await.unwrap();
        let expected: CharacteristicUpdates = [(CharacteristicType::On, true.into())].into();
        assert_eq!(
            update,
            InboundUpdate::Partial {
                service: ServiceRef::new(1, 8),
                values: expected,
            }
        );
    }

    #[tokio::test]
    async fn should_not_push_pairing_mode_changes() {
        let (tx, mut rx) = mpsc::channel(4);
        let transport = VirtualAccessoryTransport::default().with_events(tx);

        transport
            .simulate_change(Aid(4), Iid(9), true.into())
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(transport.value(Aid(4), Iid(9)), Some(true.into()));
    }

    #[tokio::test]
    async fn should_reject_simulated_value_out_of_domain() {
        let transport = VirtualAccessoryTransport::default();
        let result = transport
            .simulate_change(Aid(2), Iid(9), CharacteristicValue::Int(7))
            .await;
        assert!(matches!(result, Err(BridgeError::Validation(_))));
    }
}
