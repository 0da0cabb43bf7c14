//! Entity registry port: persisted unique-id records.

use std::future::Future;

use hkbridge_domain::error::BridgeError;
use hkbridge_domain::id::RecordId;
use hkbridge_domain::registry::RegistryEntry;

/// Persistent store of [`RegistryEntry`] records.
///
/// `(platform, unique_id)` and `entity_id` are each unique across records.
pub trait EntityRegistry {
    /// Return the record already registered under `entry`'s
    /// `(platform, unique_id)`, or insert `entry` and return it.
    fn get_or_create(
        &self,
        entry: RegistryEntry,
    ) -> impl Future<Output = Result<RegistryEntry, BridgeError>> + Send;

    fn find_by_unique_id(
        &self,
        platform: &str,
        unique_id: &str,
    ) -> impl Future<Output = Result<Option<RegistryEntry>, BridgeError>> + Send;

    fn get_by_entity_id(
        &self,
        entity_id: &str,
    ) -> impl Future<Output = Result<Option<RegistryEntry>, BridgeError>> + Send;

    fn list_by_platform(
        &self,
        platform: &str,
    ) -> impl Future<Output = Result<Vec<RegistryEntry>, BridgeError>> + Send;

    /// Rewrite the unique id of record `id`, keeping the old one in
    /// `previous_unique_id`.
    ///
    /// Fails with [`ValidationError::DuplicateUniqueId`] when another record
    /// of the same platform already owns `unique_id`, and with
    /// [`BridgeError::NotFound`] when `id` does not exist.
    ///
    /// [`ValidationError::DuplicateUniqueId`]: hkbridge_domain::error::ValidationError::DuplicateUniqueId
    fn update_unique_id(
        &self,
        id: RecordId,
        unique_id: &str,
    ) -> impl Future<Output = Result<RegistryEntry, BridgeError>> + Send;
}

impl<T: EntityRegistry + Send + Sync> EntityRegistry for std::sync::Arc<T> {
    fn get_or_create(
        &self,
        entry: RegistryEntry,
    ) -> impl Future<Output = Result<RegistryEntry, BridgeError>> + Send {
        (**self).get_or_create(entry)
    }

    fn find_by_unique_id(
        &self,
        platform: &str,
        unique_id: &str,
    ) -> impl Future<Output = Result<Option<RegistryEntry>, BridgeError>> + Send {
        (**self).find_by_unique_id(platform, unique_id)
    }

    fn get_by_entity_id(
        &self,
        entity_id: &str,
    ) -> impl Future<Output = Result<Option<RegistryEntry>, BridgeError>> + Send {
        (**self).get_by_entity_id(entity_id)
    }

    fn list_by_platform(
        &self,
        platform: &str,
    ) -> impl Future<Output = Result<Vec<RegistryEntry>, BridgeError>> + Send {
        (**self).list_by_platform(platform)
    }

    fn update_unique_id(
        &self,
        id: RecordId,
        unique_id: &str,
    ) -> impl Future<Output = Result<RegistryEntry, BridgeError>> + Send {
        (**self).update_unique_id(id, unique_id)
    }
}
