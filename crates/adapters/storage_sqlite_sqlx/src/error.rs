//! Registry database errors and their mapping onto [`BridgeError`].

use hkbridge_domain::error::{BridgeError, ValidationError};

/// Errors raised by the `SQLite` entity registry.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("cannot open registry database {url}")]
    Open {
        url: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("registry schema migration failed")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("registry query failed")]
    Query(#[from] sqlx::Error),

    /// The `(platform, unique_id)` constraint rejected a write.
    #[error("unique id {0:?} is already registered")]
    DuplicateUniqueId(String),
}

impl StorageError {
    /// Classify a failed write of `unique_id`.
    pub(crate) fn on_write(err: sqlx::Error, unique_id: &str) -> Self {
        match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::DuplicateUniqueId(unique_id.to_string())
            }
            other => Self::Query(other),
        }
    }
}

impl From<StorageError> for BridgeError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateUniqueId(unique_id) => {
                ValidationError::DuplicateUniqueId(unique_id).into()
            }
            other => Self::Storage(Box::new(other)),
        }
    }
}
