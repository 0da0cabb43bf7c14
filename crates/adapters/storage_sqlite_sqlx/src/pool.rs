//! Opening the registry database.

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::StorageError;
use crate::registry_repo::SqliteEntityRegistry;

/// How long a connection waits on a locked database file before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Location of the registry database.
pub struct Config {
    /// `SQLite` connection URL (e.g. `sqlite:hkbridge.db` or `sqlite::memory:`).
    pub database_url: String,
}

impl Config {
    /// Open the database, creating the file if needed, apply pending schema
    /// migrations and return the registry stored in it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] for an unusable URL or file, and
    /// [`StorageError::Migration`] when the schema cannot be brought up to
    /// date.
    pub async fn build(self) -> Result<SqliteEntityRegistry, StorageError> {
        let pool = open(&self.database_url).await?;
        let registry = SqliteEntityRegistry::new(pool);
        let records = registry.count().await?;
        tracing::info!(database_url = %self.database_url, records, "entity registry opened");
        Ok(registry)
    }
}

async fn open(url: &str) -> Result<SqlitePool, StorageError> {
    let open_error = |source| StorageError::Open {
        url: url.to_string(),
        source,
    };
    let options = SqliteConnectOptions::from_str(url)
        .map_err(open_error)?
        .create_if_missing(true)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .map_err(open_error)?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
