//! Supervision of long-running processes as systemd units.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use placement_deploy::host::ProcessManager;
use placement_deploy::{BoxError, IniFile};
use tracing::{debug, info};

use crate::command::CommandRunner;

/// Options for configuring `Systemd`.
pub struct SystemdOptions {
    /// Directory unit files are written to.
    pub unit_dir: PathBuf,

    /// Prefix of every unit name, e.g. `devstack@`.
    pub unit_prefix: String,

    /// User the supervised processes run as.
    pub user: String,

    /// Whether host commands run through sudo.
    pub sudo: bool,
}

/// Runs each named process as its own systemd service unit.
#[derive(Clone, Debug)]
pub struct Systemd {
    runner: CommandRunner,
    unit_dir: PathBuf,
    unit_prefix: String,
    user: String,
}

impl Systemd {
    /// Creates a new instance of `Systemd`.
    #[must_use]
    pub fn new(
        SystemdOptions {
            unit_dir,
            unit_prefix,
            user,
            sudo,
        }: SystemdOptions,
    ) -> Self {
        Self {
            runner: CommandRunner::new(sudo),
            unit_dir,
            unit_prefix,
            user,
        }
    }

    /// Unit name for the process supervised as `name`.
    #[must_use]
    pub fn unit_name(&self, name: &str) -> String {
        format!("{}{name}.service", self.unit_prefix)
    }

    fn unit_path(&self, name: &str) -> PathBuf {
        self.unit_dir.join(self.unit_name(name))
    }

    /// Unit file content for running `command` as `name`.
    #[must_use]
    pub fn unit_file(&self, name: &str, command: &[String]) -> IniFile {
        let mut unit = IniFile::new();

        unit.set("Unit", "Description", &format!("Placement deployment {name}"));
        unit.set("Service", "ExecStart", &command.join(" "));
        unit.set("Service", "User", &self.user);
        unit.set("Service", "KillMode", "process");
        unit.set("Service", "TimeoutStopSec", "300");
        unit.set("Service", "ExecReload", "/bin/kill -HUP $MAINPID");
        unit.set("Install", "WantedBy", "multi-user.target");

        unit
    }
}

#[async_trait]
impl ProcessManager for Systemd {
    async fn run(&self, name: &str, command: &[String]) -> Result<(), BoxError> {
        let unit = self.unit_name(name);

        self.runner
            .write_file(&self.unit_path(name), &self.unit_file(name, command).to_string())
            .await?;
        self.runner.run("systemctl", &["daemon-reload"]).await?;
        self.runner.run("systemctl", &["enable", unit.as_str()]).await?;
        self.runner.run("systemctl", &["restart", unit.as_str()]).await?;

        info!("{} started as {}", name, unit);

        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), BoxError> {
        let unit = self.unit_name(name);

        // systemctl refuses to stop units it has never loaded.
        if !tokio::fs::try_exists(self.unit_path(name)).await? {
            debug!("{} has no unit file, nothing to stop", unit);
            return Ok(());
        }

        self.runner.run("systemctl", &["stop", unit.as_str()]).await?;

        info!("{} stopped", unit);

        Ok(())
    }

    async fn tail_log(&self, name: &str, log: &Path) -> Result<(), BoxError> {
        let command = vec![
            "/usr/bin/tail".to_string(),
            "-F".to_string(),
            log.display().to_string(),
        ];

        self.run(name, &command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn systemd(unit_dir: PathBuf) -> Systemd {
        Systemd::new(SystemdOptions {
            unit_dir,
            unit_prefix: "devstack@".to_string(),
            user: "stack".to_string(),
            sudo: false,
        })
    }

    #[test]
    fn test_unit_file() {
        let systemd = systemd(PathBuf::from("/etc/systemd/system"));

        let command = ["/opt/venv/bin/uwsgi", "--ini", "/etc/placement/placement-uwsgi.ini"]
            .map(String::from);

        let unit = systemd.unit_file("placement-api", &command);

        assert_eq!(systemd.unit_name("placement-api"), "devstack@placement-api.service");
        assert_eq!(
            unit.get("Service", "ExecStart"),
            Some("/opt/venv/bin/uwsgi --ini /etc/placement/placement-uwsgi.ini")
        );
        assert_eq!(unit.get("Service", "User"), Some("stack"));
        assert_eq!(unit.get("Install", "WantedBy"), Some("multi-user.target"));
    }

    #[tokio::test]
    async fn test_stop_without_unit_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let systemd = systemd(dir.path().to_path_buf());

        systemd.stop("placement-api").await.unwrap();
    }
}
