//! `SQLite` implementation of [`EntityRegistry`].

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use hkbridge_app::ports::EntityRegistry;
use hkbridge_domain::error::{BridgeError, NotFoundError};
use hkbridge_domain::id::RecordId;
use hkbridge_domain::registry::RegistryEntry;
use hkbridge_domain::Timestamp;

use crate::error::StorageError;

/// Wrapper for converting database rows into domain types without polluting
/// domain structs with database concerns.
struct Wrapper(RegistryEntry);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<RegistryEntry> {
        value.map(|w| w.0)
    }
}

fn parse_timestamp(value: &str) -> Result<Timestamp, sqlx::Error> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.to_utc())
        .map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let created_at: String = row.try_get("created_at")?;
        let modified_at: String = row.try_get("modified_at")?;

        let id = RecordId::from_str(&id).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

        Ok(Self(RegistryEntry {
            id,
            entity_id: row.try_get("entity_id")?,
            domain: row.try_get("domain")?,
            platform: row.try_get("platform")?,
            unique_id: row.try_get("unique_id")?,
            previous_unique_id: row.try_get("previous_unique_id")?,
            created_at: parse_timestamp(&created_at)?,
            modified_at: parse_timestamp(&modified_at)?,
        }))
    }
}

const INSERT: &str = r"
    INSERT INTO entity_registry
        (id, entity_id, domain, platform, unique_id, previous_unique_id, created_at, modified_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (platform, unique_id) DO NOTHING
";

const SELECT_BY_ID: &str = "SELECT * FROM entity_registry WHERE id = ?";
const SELECT_BY_UNIQUE_ID: &str =
    "SELECT * FROM entity_registry WHERE platform = ? AND unique_id = ?";
const SELECT_BY_ENTITY_ID: &str = "SELECT * FROM entity_registry WHERE entity_id = ?";
const COUNT: &str = "SELECT COUNT(*) FROM entity_registry";
const SELECT_BY_PLATFORM: &str =
    "SELECT * FROM entity_registry WHERE platform = ? ORDER BY created_at, entity_id";

const UPDATE_UNIQUE_ID: &str = r"
    UPDATE entity_registry
    SET unique_id = ?, previous_unique_id = ?, modified_at = ?
    WHERE id = ?
";

/// `SQLite`-backed entity registry.
pub struct SqliteEntityRegistry {
    pool: SqlitePool,
}

impl SqliteEntityRegistry {
    /// Create a new registry using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Borrow the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of stored records, all platforms included.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] when the database cannot be read.
    pub async fn count(&self) -> Result<i64, StorageError> {
        let (count,): (i64,) = sqlx::query_as(COUNT).fetch_one(&self.pool).await?;
        Ok(count)
    }
}

impl EntityRegistry for SqliteEntityRegistry {
    async fn get_or_create(&self, entry: RegistryEntry) -> Result<RegistryEntry, BridgeError> {
        entry.validate()?;

        sqlx::query(INSERT)
            .bind(entry.id.to_string())
            .bind(&entry.entity_id)
            .bind(&entry.domain)
            .bind(&entry.platform)
            .bind(&entry.unique_id)
            .bind(&entry.previous_unique_id)
            .bind(entry.created_at.to_rfc3339())
            .bind(entry.modified_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        let stored = self
            .find_by_unique_id(&entry.platform, &entry.unique_id)
            .await?;
        Ok(stored.unwrap_or(entry))
    }

    async fn find_by_unique_id(
        &self,
        platform: &str,
        unique_id: &str,
    ) -> Result<Option<RegistryEntry>, BridgeError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_UNIQUE_ID)
            .bind(platform)
            .bind(unique_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(Wrapper::maybe(row))
    }

    async fn get_by_entity_id(&self, entity_id: &str) -> Result<Option<RegistryEntry>, BridgeError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ENTITY_ID)
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(Wrapper::maybe(row))
    }

    async fn list_by_platform(&self, platform: &str) -> Result<Vec<RegistryEntry>, BridgeError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_PLATFORM)
            .bind(platform)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn update_unique_id(
        &self,
        id: RecordId,
        unique_id: &str,
    ) -> Result<RegistryEntry, BridgeError> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(StorageError::from)?;
        let mut entry = Wrapper::maybe(row).ok_or_else(|| NotFoundError {
            entity: "RegistryEntry",
            id: id.to_string(),
        })?;

        entry.rename_unique_id(unique_id);

        sqlx::query(UPDATE_UNIQUE_ID)
            .bind(&entry.unique_id)
            .bind(&entry.previous_unique_id)
            .bind(entry.modified_at.to_rfc3339())
            .bind(entry.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|err| StorageError::on_write(err, unique_id))?;

        tx.commit().await.map_err(StorageError::from)?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Config;
    use hkbridge_domain::error::ValidationError;
    use hkbridge_domain::registry::PLATFORM;

    async fn setup() -> SqliteEntityRegistry {
        Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap()
    }

    fn entry(entity_id: &str, unique_id: &str) -> RegistryEntry {
        RegistryEntry::new(entity_id, "switch", PLATFORM, unique_id).unwrap()
    }

    #[tokio::test]
    async fn should_create_and_find_entry_by_unique_id() {
        let registry = setup().await;
        let created = registry
            .get_or_create(entry("switch.testdevice", "00:00:00:00:00:00_1_8"))
            .await
            .unwrap();

        let fetched = registry
            .find_by_unique_id(PLATFORM, "00:00:00:00:00:00_1_8")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.entity_id, "switch.testdevice");
        assert_eq!(fetched.domain, "switch");
        assert_eq!(fetched.previous_unique_id, None);
    }

    #[tokio::test]
    async fn should_return_existing_entry_when_unique_id_is_registered() {
        let registry = setup().await;
        let first = registry
            .get_or_create(entry("switch.a", "00:00:00:00:00:00_1_8"))
            .await
            .unwrap();

        let second = registry
            .get_or_create(entry("switch.b", "00:00:00:00:00:00_1_8"))
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.entity_id, "switch.a");
        assert_eq!(registry.list_by_platform(PLATFORM).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_return_none_when_entity_id_not_found() {
        let registry = setup().await;
        let found = registry.get_by_entity_id("switch.missing").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn should_list_only_entries_of_platform() {
        let registry = setup().await;
        registry
            .get_or_create(entry("switch.a", "00:00:00:00:00:00_1_8"))
            .await
            .unwrap();
        registry
            .get_or_create(
                RegistryEntry::new("switch.x", "switch", "other", "00:00:00:00:00:00_1_8").unwrap(),
            )
            .await
            .unwrap();

        let entries = registry.list_by_platform(PLATFORM).await.unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entity_id, "switch.a");
    }

    #[tokio::test]
    async fn should_rewrite_unique_id_and_keep_previous() {
        let registry = setup().await;
        let created = registry
            .get_or_create(entry("switch.a", "homekit-00:00:00:00:00:00-1-8"))
            .await
            .unwrap();

        let updated = registry
            .update_unique_id(created.id, "00:00:00:00:00:00_1_8")
            .await
            .unwrap();

        assert_eq!(updated.unique_id, "00:00:00:00:00:00_1_8");
        let stored = registry.get_by_entity_id("switch.a").await.unwrap().unwrap();
        assert_eq!(stored.unique_id, "00:00:00:00:00:00_1_8");
        assert_eq!(
            stored.previous_unique_id.as_deref(),
            Some("homekit-00:00:00:00:00:00-1-8")
        );
        assert_eq!(stored.created_at, created.created_at);
    }

    #[tokio::test]
    async fn should_reject_unique_id_owned_by_another_entry() {
        let registry = setup().await;
        let legacy = registry
            .get_or_create(entry("switch.old", "homekit-00:00:00:00:00:00-1-8"))
            .await
            .unwrap();
        registry
            .get_or_create(entry("switch.new", "00:00:00:00:00:00_1_8"))
            .await
            .unwrap();

        let result = registry
            .update_unique_id(legacy.id, "00:00:00:00:00:00_1_8")
            .await;

        assert!(matches!(
            result,
            Err(BridgeError::Validation(ValidationError::DuplicateUniqueId(_)))
        ));
        let stored = registry.get_by_entity_id("switch.old").await.unwrap().unwrap();
        assert_eq!(stored.unique_id, "homekit-00:00:00:00:00:00-1-8");
    }

    #[tokio::test]
    async fn should_return_not_found_when_updating_unknown_entry() {
        let registry = setup().await;
        let result = registry
            .update_unique_id(RecordId::new(), "00:00:00:00:00:00_1_8")
            .await;
        assert!(matches!(result, Err(BridgeError::NotFound(_))));
    }
}
