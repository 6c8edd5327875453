//! Lifecycle state persisted between hook invocations.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::BackendMode;
use crate::error::{Error, Result};

/// File name of the state record inside the state directory.
pub const STATE_FILENAME: &str = "placement-deploy.json";

/// Last phase that completed successfully.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Nothing has run, or `cleanup` ran last.
    #[default]
    Uninstalled,

    /// `install` completed.
    Installed,

    /// `configure` completed.
    Configured,

    /// `init` completed.
    Initialized,

    /// `start` completed and the service answered.
    Running,

    /// `stop` completed.
    Stopped,
}

/// Name-keyed reference to what `start` launched.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RunningProcessHandle {
    /// A process supervised by the process manager.
    Process {
        /// Supervised process name.
        name: String,
    },

    /// A site enabled on the shared web server.
    Site {
        /// Site name.
        name: String,
    },
}

impl RunningProcessHandle {
    /// Backend mode the handle was created under.
    #[must_use]
    pub const fn mode(&self) -> BackendMode {
        match self {
            Self::Process { .. } => BackendMode::EmbeddedServer,
            Self::Site { .. } => BackendMode::ProxiedSite,
        }
    }
}

/// Persisted lifecycle record.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct LifecycleState {
    /// Last completed phase.
    pub phase: Phase,

    /// Backend mode chosen by the last `configure`.
    pub backend_mode: Option<BackendMode>,

    /// What `start` launched, until `stop` tears it down.
    pub handle: Option<RunningProcessHandle>,
}

/// Reads and writes the lifecycle record.
#[derive(Clone, Debug)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Creates a store keeping its record in `state_dir`.
    #[must_use]
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(STATE_FILENAME),
        }
    }

    /// Path of the record.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the record, returning the default state if none was written yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read or decoded.
    pub async fn load(&self) -> Result<LifecycleState> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::State("failed to decode lifecycle state", e)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no lifecycle state at {}", self.path.display());
                Ok(LifecycleState::default())
            }
            Err(e) => Err(Error::Io("failed to read lifecycle state", e)),
        }
    }

    /// Writes the record.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory or record cannot be written.
    pub async fn save(&self, state: &LifecycleState) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::Io("failed to create state directory", e))?;
        }

        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| Error::State("failed to encode lifecycle state", e))?;

        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| Error::Io("failed to write lifecycle state", e))
    }

    /// Deletes the record. A missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be removed.
    pub async fn clear(&self) -> Result<()> {
        crate::fs::remove_if_exists(&self.path).await
    }
}
