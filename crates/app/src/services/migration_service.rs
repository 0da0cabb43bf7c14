//! Identity migration: rewrites legacy unique ids to the canonical scheme.
//!
//! Runs once at setup, after accessories have been observed (legacy serial
//! ids need the live accessory to resolve the pairing MAC) and before any
//! entity is created. Only the record's `unique_id` changes; its entity id
//! and every other attribute are preserved.

use hkbridge_domain::error::{BridgeError, ValidationError};
use hkbridge_domain::event::{Event, EventType};
use hkbridge_domain::registry::{PLATFORM, RegistryEntry};
use hkbridge_domain::unique_id::{self, CanonicalId, UniqueIdFormat};

use crate::ports::{AccessoryDirectory, EntityRegistry, EventPublisher};

/// Why a record was left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The unique id matches no known format.
    Unrecognised,
    /// The canonical id already belongs to another record.
    Conflict { owner: String },
    /// The legacy id names the serial number of another device than the
    /// accessory observed at its aid.
    SerialMismatch {
        expected: String,
        observed: Option<String>,
    },
}

/// Result of migrating one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    Migrated { from: String, to: String },
    /// Already canonical.
    Unchanged,
    /// The accessory needed to resolve the MAC has not been observed yet.
    Deferred,
    Skipped(SkipReason),
}

/// Tally of a [`IdentityMigrator::migrate_all`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: usize,
    pub unchanged: usize,
    pub deferred: usize,
    pub skipped: usize,
}

impl MigrationReport {
    fn record(&mut self, outcome: &MigrationOutcome) {
        match outcome {
            MigrationOutcome::Migrated { .. } => self.migrated += 1,
            MigrationOutcome::Unchanged => self.unchanged += 1,
            MigrationOutcome::Deferred => self.deferred += 1,
            MigrationOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

enum Target {
    Canonical(CanonicalId),
    Unchanged,
    Deferred,
    Unrecognised,
    ForeignSerial {
        expected: String,
        observed: Option<String>,
    },
}

/// Application service migrating registry records of the bridge platform.
pub struct IdentityMigrator<R, D, P> {
    registry: R,
    directory: D,
    publisher: P,
}

impl<R, D, P> IdentityMigrator<R, D, P>
where
    R: EntityRegistry + Sync,
    D: AccessoryDirectory + Sync,
    P: EventPublisher + Sync,
{
    pub fn new(registry: R, directory: D, publisher: P) -> Self {
        Self {
            registry,
            directory,
            publisher,
        }
    }

    /// Migrate a single record.
    ///
    /// Migrating an already migrated record is a no-op returning
    /// [`MigrationOutcome::Unchanged`].
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the registry.
    #[tracing::instrument(skip(self, entry), fields(entity_id = %entry.entity_id, unique_id = %entry.unique_id))]
    pub async fn migrate(&self, entry: &RegistryEntry) -> Result<MigrationOutcome, BridgeError> {
        let target = match self.target(&entry.unique_id) {
            Target::Canonical(target) => target.to_string(),
            Target::Unchanged => return Ok(MigrationOutcome::Unchanged),
            Target::Deferred => {
                tracing::debug!("accessory not observed yet, migration deferred");
                return Ok(MigrationOutcome::Deferred);
            }
            Target::Unrecognised => {
                tracing::warn!("unrecognised unique id, record left untouched");
                return Ok(MigrationOutcome::Skipped(SkipReason::Unrecognised));
            }
            Target::ForeignSerial { expected, observed } => {
                tracing::warn!(
                    %expected,
                    observed = observed.as_deref().unwrap_or("-"),
                    "serial number belongs to another device, record left untouched"
                );
                return Ok(MigrationOutcome::Skipped(SkipReason::SerialMismatch {
                    expected,
                    observed,
                }));
            }
        };

        if let Some(owner) = self
            .registry
            .find_by_unique_id(&entry.platform, &target)
            .await?
            .filter(|owner| owner.id != entry.id)
        {
            return Ok(conflict(&target, owner.entity_id));
        }

        let migrated = match self.registry.update_unique_id(entry.id, &target).await {
            Ok(migrated) => migrated,
            Err(BridgeError::Validation(ValidationError::DuplicateUniqueId(_))) => {
                let owner = self
                    .registry
                    .find_by_unique_id(&entry.platform, &target)
                    .await?
                    .map(|owner| owner.entity_id)
                    .unwrap_or_default();
                return Ok(conflict(&target, owner));
            }
            Err(err) => return Err(err),
        };

        tracing::info!(to = %target, "unique id migrated");
        let event = Event::new(
            EventType::UniqueIdMigrated,
            Some(migrated.entity_id.clone()),
            serde_json::json!({ "from": entry.unique_id, "to": target }),
        );
        if let Err(err) = self.publisher.publish(event).await {
            tracing::warn!(%err, "failed to publish unique_id_migrated event");
        }

        Ok(MigrationOutcome::Migrated {
            from: entry.unique_id.clone(),
            to: target,
        })
    }

    /// Migrate every record of the bridge platform.
    ///
    /// A record that cannot be migrated never stops the others.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the registry.
    #[tracing::instrument(skip(self))]
    pub async fn migrate_all(&self) -> Result<MigrationReport, BridgeError> {
        let mut report = MigrationReport::default();
        for entry in self.registry.list_by_platform(PLATFORM).await? {
            let outcome = self.migrate(&entry).await?;
            report.record(&outcome);
        }
        tracing::info!(
            migrated = report.migrated,
            unchanged = report.unchanged,
            deferred = report.deferred,
            skipped = report.skipped,
            "unique id migration complete"
        );
        Ok(report)
    }

    fn target(&self, unique_id: &str) -> Target {
        match unique_id::parse(unique_id) {
            None => Target::Unrecognised,
            Some(UniqueIdFormat::Canonical(_)) => Target::Unchanged,
            Some(UniqueIdFormat::LegacyMac { mac, aid, sid }) => Target::Canonical(CanonicalId {
                mac,
                aid,
                sid,
                cid: None,
            }),
            Some(UniqueIdFormat::LegacySerial {
                serial,
                aid,
                sid,
                cid,
            }) => {
                let Some(mac) = self.directory.mac_for(aid) else {
                    return Target::Deferred;
                };
                let observed = self.directory.serial_number_for(aid);
                if observed.as_deref() != Some(serial.as_str()) {
                    return Target::ForeignSerial {
                        expected: serial,
                        observed,
                    };
                }
                Target::Canonical(CanonicalId { mac, aid, sid, cid })
            }
        }
    }
}

fn conflict(target: &str, owner: String) -> MigrationOutcome {
    tracing::warn!(%target, %owner, "canonical unique id already registered, record left untouched");
    MigrationOutcome::Skipped(SkipReason::Conflict { owner })
}
