//! Switch service: routes hub service calls to the reconciler.

use std::sync::Arc;

use hkbridge_domain::entity::Entity;
use hkbridge_domain::error::{BridgeError, NotFoundError, ValidationError};

use crate::ports::{AccessoryTransport, EventPublisher};
use crate::reconciler::Reconciler;

pub const TURN_ON: &str = "turn_on";
pub const TURN_OFF: &str = "turn_off";
pub const TOGGLE: &str = "toggle";

/// Application service handling `turn_on` / `turn_off` / `toggle`.
pub struct SwitchService<T, P> {
    reconciler: Arc<Reconciler<T, P>>,
}

impl<T, P> SwitchService<T, P>
where
    T: AccessoryTransport + Send + Sync,
    P: EventPublisher + Send + Sync,
{
    pub fn new(reconciler: Arc<Reconciler<T, P>>) -> Self {
        Self { reconciler }
    }

    /// Dispatch a service call by name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnsupportedServiceCall`] for anything but
    /// the three switch services, otherwise whatever the command returns.
    #[tracing::instrument(skip(self))]
    pub async fn handle_service_call(&self, entity_id: &str, service: &str) -> Result<Entity, BridgeError> {
        match service {
            TURN_ON => self.turn_on(entity_id).await,
            TURN_OFF => self.turn_off(entity_id).await,
            TOGGLE => self.toggle(entity_id).await,
            other => Err(ValidationError::UnsupportedServiceCall(other.to_string()).into()),
        }
    }

    /// # Errors
    ///
    /// See [`Reconciler::set_on`].
    pub async fn turn_on(&self, entity_id: &str) -> Result<Entity, BridgeError> {
        self.reconciler.set_on(entity_id, true).await
    }

    /// # Errors
    ///
    /// See [`Reconciler::set_on`].
    pub async fn turn_off(&self, entity_id: &str) -> Result<Entity, BridgeError> {
        self.reconciler.set_on(entity_id, false).await
    }

    /// Switch off when on, on otherwise (including when unavailable).
    ///
    /// # Errors
    ///
    /// See [`Reconciler::set_on`].
    pub async fn toggle(&self, entity_id: &str) -> Result<Entity, BridgeError> {
        let entity = self.reconciler.entity(entity_id).ok_or_else(|| NotFoundError {
            entity: "Entity",
            id: entity_id.to_string(),
        })?;
        self.reconciler.set_on(entity_id, !entity.is_on()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hkbridge_domain::characteristic::CharacteristicValue;
    use hkbridge_domain::id::{Iid, ServiceRef};
    use hkbridge_domain::projection::SwitchKind;

    use crate::reconciler::ReconcilerConfig;
    use crate::testing::{FakeTransport, RecordingPublisher, bind, mac, outlet_accessory};

    fn make_service() -> (
        SwitchService<Arc<FakeTransport>, Arc<RecordingPublisher>>,
        Arc<FakeTransport>,
    ) {
        let transport = Arc::new(FakeTransport::default());
        transport.add(outlet_accessory(1));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&transport),
            Arc::new(RecordingPublisher::default()),
            ReconcilerConfig::default(),
        ));
        reconciler.add_accessory(mac(), outlet_accessory(1));
        bind(&reconciler, "switch.testdevice", ServiceRef::new(1, 8), None, SwitchKind::Outlet);
        (SwitchService::new(reconciler), transport)
    }

    #[tokio::test]
    async fn should_turn_on_and_off() {
        let (service, transport) = make_service();

        let on = service.handle_service_call("switch.testdevice", TURN_ON).await.unwrap();
        assert!(on.is_on());
        let off = service.handle_service_call("switch.testdevice", TURN_OFF).await.unwrap();
        assert!(!off.is_on());

        let values: Vec<CharacteristicValue> = transport.writes().into_iter().map(|w| w.value).collect();
        assert_eq!(values, vec![true.into(), false.into()]);
        assert!(transport.writes().iter().all(|w| w.iid == Iid(9)));
    }

    #[tokio::test]
    async fn should_toggle_current_state() {
        let (service, _) = make_service();

        assert!(service.toggle("switch.testdevice").await.unwrap().is_on());
        assert!(!service.toggle("switch.testdevice").await.unwrap().is_on());
    }

    #[tokio::test]
    async fn should_reject_unknown_service_call() {
        let (service, transport) = make_service();

        let result = service.handle_service_call("switch.testdevice", "open").await;

        assert!(matches!(
            result,
            Err(BridgeError::Validation(ValidationError::UnsupportedServiceCall(_)))
        ));
        assert!(transport.writes().is_empty());
    }

    #[tokio::test]
    async fn should_return_not_found_when_toggling_unknown_entity() {
        let (service, _) = make_service();
        let result = service.toggle("switch.missing").await;
        assert!(matches!(result, Err(BridgeError::NotFound(_))));
    }
}
