//! Dedicated database provisioning and schema synchronization.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::DatabaseSettings;
use crate::error::{Error, Result};
use crate::host::{DatabaseAdmin, MigrationRunner};

/// Prepares the dedicated database before the service starts.
#[derive(Clone)]
pub struct DatabaseBootstrapper {
    admin: Arc<dyn DatabaseAdmin>,
    migrations: Arc<dyn MigrationRunner>,
}

impl DatabaseBootstrapper {
    /// Creates a new `DatabaseBootstrapper`.
    #[must_use]
    pub fn new(admin: Arc<dyn DatabaseAdmin>, migrations: Arc<dyn MigrationRunner>) -> Self {
        Self { admin, migrations }
    }

    /// Drops and recreates the database. All data in it is lost.
    ///
    /// # Errors
    ///
    /// Returns an error if the database server rejects the drop or create.
    pub async fn reset_database(&self, name: &str) -> Result<()> {
        warn!("dropping and recreating database {name}");

        self.admin
            .recreate_database(name)
            .await
            .map_err(|e| Error::Collaborator("failed to recreate database", e))
    }

    /// Runs schema synchronization to completion and returns how long it took.
    ///
    /// # Errors
    ///
    /// Returns an error if the migration runner fails.
    pub async fn sync_schema(&self) -> Result<Duration> {
        info!("synchronizing database schema...");

        let started = Instant::now();

        self.migrations
            .sync_schema()
            .await
            .map_err(|e| Error::Collaborator("failed to synchronize database schema", e))?;

        let elapsed = started.elapsed();

        info!(elapsed_ms = elapsed.as_millis(), "database schema synchronized");

        Ok(elapsed)
    }

    /// Resets the database when the settings ask for it, then syncs the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if either step fails. The schema is never synced after
    /// a failed reset.
    pub async fn bootstrap(&self, settings: &DatabaseSettings) -> Result<Duration> {
        if settings.reset_on_init {
            self.reset_database(&settings.name).await?;
        }

        self.sync_schema().await
    }
}
