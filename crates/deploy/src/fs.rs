use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

/// Removes a file, treating an already absent file as success.
pub(crate) async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io("failed to remove file", e)),
    }
}

/// Writes `content` to `path`, creating parent directories as needed.
pub(crate) async fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::Io("failed to create config directory", e))?;
    }

    tokio::fs::write(path, content)
        .await
        .map_err(|e| Error::Io("failed to write config file", e))
}
