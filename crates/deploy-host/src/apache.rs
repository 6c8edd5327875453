//! The shared Apache web server on Debian-style hosts.

use std::path::PathBuf;

use async_trait::async_trait;
use placement_deploy::BoxError;
use placement_deploy::host::WebServer;
use tracing::info;

use crate::command::CommandRunner;

/// Packages providing Apache with Python 3 WSGI support.
static WSGI_PACKAGES: &[&str] = &["apache2", "apache2-dev", "libapache2-mod-wsgi-py3"];

/// Packages providing Apache with the uWSGI proxy modules.
static UWSGI_PROXY_PACKAGES: &[&str] = &["apache2"];

/// Modules routing requests to a uWSGI socket.
static UWSGI_PROXY_MODULES: &[&str] = &["proxy", "proxy_uwsgi"];

/// Options for configuring `Apache`.
pub struct ApacheOptions {
    /// Service and directory name, usually `apache2`.
    pub name: String,

    /// Directory site configs are written to.
    pub sites_dir: PathBuf,

    /// Directory Apache writes logs to.
    pub log_dir: PathBuf,

    /// Whether host commands run through sudo.
    pub sudo: bool,
}

impl ApacheOptions {
    /// Default layout for a server named `name`.
    #[must_use]
    pub fn with_name(name: &str, sudo: bool) -> Self {
        Self {
            name: name.to_string(),
            sites_dir: PathBuf::from(format!("/etc/{name}/sites-available")),
            log_dir: PathBuf::from(format!("/var/log/{name}")),
            sudo,
        }
    }
}

/// Controls Apache through `apt-get`, `a2enmod`, `a2ensite`, `a2dissite` and `systemctl`.
#[derive(Clone, Debug)]
pub struct Apache {
    log_dir: PathBuf,
    name: String,
    runner: CommandRunner,
    sites_dir: PathBuf,
}

impl Apache {
    /// Creates a new instance of `Apache`.
    #[must_use]
    pub fn new(
        ApacheOptions {
            name,
            sites_dir,
            log_dir,
            sudo,
        }: ApacheOptions,
    ) -> Self {
        Self {
            log_dir,
            name,
            runner: CommandRunner::new(sudo),
            sites_dir,
        }
    }

    async fn apt_install(&self, packages: &[&str]) -> Result<(), BoxError> {
        let mut args = vec!["install", "-y", "--no-install-recommends"];
        args.extend_from_slice(packages);

        self.runner
            .run_with_env("apt-get", &args, &[("DEBIAN_FRONTEND", "noninteractive")])
            .await?;

        Ok(())
    }
}

#[async_trait]
impl WebServer for Apache {
    fn site_config_path(&self, site: &str) -> PathBuf {
        self.sites_dir.join(format!("{site}.conf"))
    }

    fn site_log_path(&self, site: &str) -> PathBuf {
        self.log_dir.join(format!("{site}.log"))
    }

    async fn install_wsgi(&self) -> Result<(), BoxError> {
        self.apt_install(WSGI_PACKAGES).await?;
        self.runner.run("a2enmod", &["wsgi"]).await?;

        info!("{} wsgi support installed", self.name);

        Ok(())
    }

    async fn install_uwsgi_proxy(&self) -> Result<(), BoxError> {
        self.apt_install(UWSGI_PROXY_PACKAGES).await?;
        self.runner.run("a2enmod", UWSGI_PROXY_MODULES).await?;

        info!("{} uwsgi proxy support installed", self.name);

        Ok(())
    }

    async fn enable_site(&self, site: &str) -> Result<(), BoxError> {
        self.runner.run("a2ensite", &[site]).await?;

        Ok(())
    }

    async fn disable_site(&self, site: &str) -> Result<(), BoxError> {
        self.runner.run("a2dissite", &[site]).await?;

        Ok(())
    }

    async fn restart(&self) -> Result<(), BoxError> {
        info!("restarting {}", self.name);

        self.runner
            .run("systemctl", &["restart", self.name.as_str()])
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debian_layout() {
        let apache = Apache::new(ApacheOptions::with_name("apache2", true));

        assert_eq!(
            apache.site_config_path("placement-api"),
            PathBuf::from("/etc/apache2/sites-available/placement-api.conf")
        );
        assert_eq!(
            apache.site_log_path("placement-api"),
            PathBuf::from("/var/log/apache2/placement-api.log")
        );
    }
}
