//! Entity setup: registers and builds the switch entities of an accessory.

use hkbridge_domain::accessory::Accessory;
use hkbridge_domain::entity::Entity;
use hkbridge_domain::error::BridgeError;
use hkbridge_domain::id::MacAddress;
use hkbridge_domain::platform::{PlatformTable, SWITCH_DOMAIN};
use hkbridge_domain::registry::{PLATFORM, RegistryEntry};

use crate::ports::EntityRegistry;

/// Turn a display name into an entity-id slug: lowercase ASCII
/// alphanumerics separated by single underscores.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("homekit");
    }
    slug
}

/// Application service creating registry records and entities for the
/// switch entities the platform table finds on an accessory.
pub struct EntitySetup<R> {
    registry: R,
    platform: PlatformTable,
}

impl<R: EntityRegistry + Sync> EntitySetup<R> {
    pub fn new(registry: R, platform: PlatformTable) -> Self {
        Self { registry, platform }
    }

    /// Build the entities of `accessory`, observed on pairing `mac`.
    ///
    /// A record already registered under the canonical unique id keeps its
    /// entity id; otherwise a new record is created with a fresh entity id.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the registry.
    #[tracing::instrument(skip(self, accessory), fields(aid = %accessory.aid))]
    pub async fn setup_accessory(
        &self,
        mac: &MacAddress,
        accessory: &Accessory,
    ) -> Result<Vec<Entity>, BridgeError> {
        let name = accessory.name().unwrap_or("HomeKit Accessory");
        let mut entities = Vec::new();
        for descriptor in self.platform.describe(accessory) {
            let unique_id = descriptor.unique_id(mac).to_string();
            let entry = match self.registry.find_by_unique_id(PLATFORM, &unique_id).await? {
                Some(existing) => existing,
                None => {
                    let base = match descriptor.suffix {
                        Some(suffix) => format!("{SWITCH_DOMAIN}.{}_{suffix}", slugify(name)),
                        None => format!("{SWITCH_DOMAIN}.{}", slugify(name)),
                    };
                    let entity_id = self.free_entity_id(&base).await?;
                    tracing::info!(%entity_id, %unique_id, "registering new entity");
                    let entry = RegistryEntry::new(entity_id, SWITCH_DOMAIN, PLATFORM, unique_id)?;
                    self.registry.get_or_create(entry).await?
                }
            };

            let friendly_name = match descriptor.name_suffix {
                Some(suffix) => format!("{name} {suffix}"),
                None => name.to_string(),
            };
            let mut builder = Entity::builder()
                .entity_id(entry.entity_id)
                .unique_id(entry.unique_id)
                .friendly_name(friendly_name)
                .service(descriptor.service)
                .kind(descriptor.kind);
            if let Some(cid) = descriptor.cid {
                builder = builder.cid(cid);
            }
            entities.push(builder.build()?);
        }
        Ok(entities)
    }

    /// `base`, or `base_2`, `base_3`… whichever is not registered yet.
    async fn free_entity_id(&self, base: &str) -> Result<String, BridgeError> {
        if self.registry.get_by_entity_id(base).await?.is_none() {
            return Ok(base.to_string());
        }
        let mut n = 2_u32;
        loop {
            let candidate = format!("{base}_{n}");
            if self.registry.get_by_entity_id(&candidate).await?.is_none() {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}
