use std::path::PathBuf;

use async_trait::async_trait;
use placement_deploy::BoxError;
use placement_deploy::host::PackageInstaller;
use tracing::info;

use crate::command::CommandRunner;

/// Installs Python packages with pip.
#[derive(Clone, Debug)]
pub struct Pip {
    pip: PathBuf,
    runner: CommandRunner,
}

impl Pip {
    /// Creates an installer using the `pip` executable at `pip`.
    #[must_use]
    pub const fn new(pip: PathBuf, sudo: bool) -> Self {
        Self {
            pip,
            runner: CommandRunner::new(sudo),
        }
    }
}

#[async_trait]
impl PackageInstaller for Pip {
    async fn install_python_package(&self, name: &str) -> Result<(), BoxError> {
        let pip = self.pip.display().to_string();

        self.runner
            .run(&pip, &["install", "--upgrade-strategy", "only-if-needed", name])
            .await?;

        info!("python package {} installed", name);

        Ok(())
    }
}
