//! Bridge setup: the startup sequence of one pairing.
//!
//! 1. discover the accessories and start mirroring them
//! 2. migrate legacy unique ids (needs the observed accessories)
//! 3. register and bind the switch entities
//!
//! Reconciliation (pushes, polls, commands) starts only afterwards.

use std::sync::Arc;

use hkbridge_domain::error::BridgeError;
use hkbridge_domain::id::MacAddress;
use hkbridge_domain::platform::PlatformTable;

use crate::ports::{AccessoryTransport, EntityRegistry, EventPublisher};
use crate::reconciler::Reconciler;
use crate::services::entity_setup::EntitySetup;
use crate::services::migration_service::{IdentityMigrator, MigrationReport};

/// Summary of a completed setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupReport {
    pub accessories: usize,
    pub migration: MigrationReport,
    pub entities: usize,
}

/// Application service running the startup sequence.
pub struct BridgeService<T, P, R> {
    reconciler: Arc<Reconciler<T, P>>,
    migrator: IdentityMigrator<R, Arc<Reconciler<T, P>>, P>,
    setup: EntitySetup<R>,
    mac: MacAddress,
}

impl<T, P, R> BridgeService<T, P, R>
where
    T: AccessoryTransport + Send + Sync,
    P: EventPublisher + Clone + Send + Sync,
    R: EntityRegistry + Clone + Sync,
{
    pub fn new(
        reconciler: Arc<Reconciler<T, P>>,
        registry: R,
        publisher: P,
        platform: PlatformTable,
        mac: MacAddress,
    ) -> Self {
        Self {
            migrator: IdentityMigrator::new(registry.clone(), Arc::clone(&reconciler), publisher),
            setup: EntitySetup::new(registry, platform),
            reconciler,
            mac,
        }
    }

    /// Run the startup sequence.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] when the accessory database cannot
    /// be read, or a storage error from the registry.
    #[tracing::instrument(skip(self), fields(mac = %self.mac))]
    pub async fn setup(&self) -> Result<SetupReport, BridgeError> {
        let aids = self.reconciler.discover(&self.mac).await?;
        let migration = self.migrator.migrate_all().await?;

        let mut entities = 0;
        for aid in &aids {
            let Some(accessory) = self.reconciler.accessory(*aid) else {
                continue;
            };
            for entity in self.setup.setup_accessory(&self.mac, &accessory).await? {
                let entity = self.reconciler.bind_entity(entity)?;
                tracing::debug!(entity_id = %entity.entity_id, state = %entity.state, "entity bound");
                entities += 1;
            }
        }

        tracing::info!(accessories = aids.len(), entities, "bridge setup complete");
        Ok(SetupReport {
            accessories: aids.len(),
            migration,
            entities,
        })
    }
}
