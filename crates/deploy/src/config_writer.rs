//! Renders the service config, the embedded server config and the site config.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::DeploymentSpec;
use crate::error::{Error, Result};
use crate::ini::IniFile;
use crate::site_template::{DEFAULT_SITE_TEMPLATE, SiteValues};

/// One upserted key of the service config.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigEntry {
    /// Ini section.
    pub section: &'static str,

    /// Option name.
    pub key: &'static str,

    /// Rendered value.
    pub value: String,
}

impl ConfigEntry {
    fn new(section: &'static str, key: &'static str, value: impl Into<String>) -> Self {
        Self {
            section,
            key,
            value: value.into(),
        }
    }
}

/// Writes every generated artifact for a deployment.
///
/// Output depends only on the `DeploymentSpec`, so rewriting with the same
/// spec yields identical files.
#[derive(Clone, Copy, Debug)]
pub struct ConfigWriter<'a> {
    spec: &'a DeploymentSpec,
}

impl<'a> ConfigWriter<'a> {
    /// Creates a writer for `spec`.
    #[must_use]
    pub const fn new(spec: &'a DeploymentSpec) -> Self {
        Self { spec }
    }

    /// Entries upserted into the shared service config, in write order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection URL cannot be built.
    pub fn service_entries(&self) -> Result<Vec<ConfigEntry>> {
        let mut entries = Vec::new();

        if let Some(database) = self.spec.database() {
            entries.push(ConfigEntry::new(
                "placement_database",
                "connection",
                database.connection_url()?,
            ));
        }

        entries.push(ConfigEntry::new(
            "DEFAULT",
            "debug",
            if self.spec.debug() { "True" } else { "False" },
        ));
        entries.push(ConfigEntry::new(
            "api",
            "auth_strategy",
            self.spec.service().auth_strategy.as_str(),
        ));

        let credentials = self.spec.credentials();
        entries.extend([
            ConfigEntry::new("keystone_authtoken", "auth_type", credentials.auth_type.as_str()),
            ConfigEntry::new("keystone_authtoken", "auth_url", credentials.auth_url.as_str()),
            ConfigEntry::new("keystone_authtoken", "username", credentials.username.as_str()),
            ConfigEntry::new("keystone_authtoken", "password", credentials.password.as_str()),
            ConfigEntry::new(
                "keystone_authtoken",
                "user_domain_name",
                credentials.user_domain_name.as_str(),
            ),
            ConfigEntry::new(
                "keystone_authtoken",
                "project_name",
                credentials.project_name.as_str(),
            ),
            ConfigEntry::new(
                "keystone_authtoken",
                "project_domain_name",
                credentials.project_domain_name.as_str(),
            ),
        ]);

        Ok(entries)
    }

    /// Upserts the service entries into the shared config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory or file cannot be written.
    pub async fn write_service_config(&self) -> Result<PathBuf> {
        tokio::fs::create_dir_all(self.spec.conf_dir())
            .await
            .map_err(|e| Error::Io("failed to create config directory", e))?;

        let path = self.spec.conf_file();
        let mut ini = IniFile::load(&path).await?;

        for ConfigEntry {
            section,
            key,
            value,
        } in self.service_entries()?
        {
            debug!("setting {}.{} in {}", section, key, path.display());
            ini.set(section, key, &value);
        }

        ini.store(&path).await?;

        info!("wrote service config {}", path.display());

        Ok(path)
    }

    /// Config of the embedded application server, built from scratch.
    #[must_use]
    pub fn app_server_config(&self) -> IniFile {
        let wsgi = self.spec.public_wsgi().display().to_string();
        let mount = format!("/{}={}", self.spec.service().base_path, wsgi);
        let socket = self.spec.uwsgi_socket().display().to_string();
        let processes = self.spec.api_workers().to_string();

        let mut ini = IniFile::new();
        for (key, value) in [
            ("wsgi-file", wsgi.as_str()),
            ("procname-prefix", self.spec.service().name.as_str()),
            ("processes", processes.as_str()),
            ("master", "true"),
            ("die-on-term", "true"),
            ("exit-on-reload", "false"),
            ("enable-threads", "true"),
            ("plugins", "http,python3"),
            ("thunder-lock", "true"),
            ("buffer-size", "65535"),
            ("lazy-apps", "true"),
            ("socket", socket.as_str()),
            ("chmod-socket", "666"),
            ("mount", mount.as_str()),
            ("manage-script-name", "true"),
        ] {
            ini.set("uwsgi", key, value);
        }

        if let Some(venv) = self.spec.venv() {
            ini.set("uwsgi", "home", &venv.root.display().to_string());
        }

        ini
    }

    /// Writes the embedded application server config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn write_app_server_config(&self) -> Result<PathBuf> {
        let path = self.spec.uwsgi_conf_file();

        crate::fs::write_file(&path, &self.app_server_config().to_string()).await?;

        info!("wrote application server config {}", path.display());

        Ok(path)
    }

    /// Web-server site routing the public path to the embedded server's socket.
    #[must_use]
    pub fn proxy_site_config(&self) -> String {
        format!(
            "ProxyPass \"/{}\" \"unix:{}|uwsgi://uwsgi-uds-{}\" retry=0 acquire=1\n",
            self.spec.service().base_path,
            self.spec.uwsgi_socket().display(),
            self.spec.process_name(),
        )
    }

    /// Writes the proxy site for the embedded server to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn write_proxy_site_config(&self, path: &Path) -> Result<()> {
        crate::fs::write_file(path, &self.proxy_site_config()).await?;

        info!("wrote proxy site config {}", path.display());

        Ok(())
    }

    /// Renders the site config from the configured or built-in template.
    ///
    /// # Errors
    ///
    /// Returns an error if a template override cannot be read or leaves a
    /// placeholder unresolved.
    pub async fn render_site_config(&self) -> Result<String> {
        let values = SiteValues::from_spec(self.spec);

        match self.spec.site_template() {
            Some(template_path) => {
                let template = tokio::fs::read_to_string(template_path)
                    .await
                    .map_err(|e| Error::Io("failed to read site template", e))?;
                values.render(&template)
            }
            None => values.render(DEFAULT_SITE_TEMPLATE),
        }
    }

    /// Renders the site config and writes it to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails or the file cannot be written.
    pub async fn write_site_config(&self, path: &Path) -> Result<()> {
        let rendered = self.render_site_config().await?;

        crate::fs::write_file(path, &rendered).await?;

        info!("wrote site config {}", path.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::spec::tests::options;
    use crate::{DatabaseBackend, DatabaseSettings, DeploymentOptions};

    #[test]
    fn test_service_entries_without_database() {
        let spec = DeploymentSpec::new(options()).unwrap();

        let entries = ConfigWriter::new(&spec).service_entries().unwrap();

        assert!(entries.iter().all(|e| e.section != "placement_database"));
        assert_eq!(entries.len(), 9);
        assert_eq!(
            entries
                .iter()
                .filter(|e| e.section == "keystone_authtoken")
                .map(|e| e.key)
                .collect::<Vec<_>>(),
            vec![
                "auth_type",
                "auth_url",
                "username",
                "password",
                "user_domain_name",
                "project_name",
                "project_domain_name",
            ]
        );
    }

    #[test]
    fn test_service_entries_with_database() {
        let spec = DeploymentSpec::new(DeploymentOptions {
            database: Some(DatabaseSettings {
                backend: DatabaseBackend::Mysql,
                host: "db".to_string(),
                user: "root".to_string(),
                password: "pw".to_string(),
                name: "placement".to_string(),
                reset_on_init: true,
            }),
            ..options()
        })
        .unwrap();

        let entries = ConfigWriter::new(&spec).service_entries().unwrap();

        assert_eq!(
            entries[0],
            ConfigEntry::new(
                "placement_database",
                "connection",
                "mysql+pymysql://root:pw@db/placement?charset=utf8"
            )
        );
    }

    #[test]
    fn test_app_server_config_mounts_base_path() {
        let spec = DeploymentSpec::new(options()).unwrap();

        let ini = ConfigWriter::new(&spec).app_server_config();

        assert_eq!(
            ini.get("uwsgi", "mount"),
            Some("/placement=/usr/local/bin/placement-api")
        );
        assert_eq!(
            ini.get("uwsgi", "socket"),
            Some("/var/run/uwsgi/placement-api.socket")
        );
        assert_eq!(ini.get("uwsgi", "processes"), Some("2"));
        assert_eq!(ini.get("uwsgi", "home"), None);
    }

    #[test]
    fn test_proxy_site_routes_base_path_to_socket() {
        let spec = DeploymentSpec::new(options()).unwrap();

        assert_eq!(
            ConfigWriter::new(&spec).proxy_site_config(),
            "ProxyPass \"/placement\" \"unix:/var/run/uwsgi/placement-api.socket|uwsgi://uwsgi-uds-placement-api\" retry=0 acquire=1\n"
        );
    }

    #[tokio::test]
    async fn test_service_config_preserves_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let spec = DeploymentSpec::new(DeploymentOptions {
            conf_dir: dir.path().join("etc"),
            ..options()
        })
        .unwrap();
        tokio::fs::create_dir_all(spec.conf_dir()).await.unwrap();
        tokio::fs::write(
            spec.conf_file(),
            "[oslo_policy]\nenforce_scope = True\n[api]\nauth_strategy = noauth2\n",
        )
        .await
        .unwrap();

        ConfigWriter::new(&spec).write_service_config().await.unwrap();

        let ini = IniFile::load(&spec.conf_file()).await.unwrap();
        assert_eq!(ini.get("oslo_policy", "enforce_scope"), Some("True"));
        assert_eq!(ini.get("api", "auth_strategy"), Some("keystone"));
        assert_eq!(ini.get("keystone_authtoken", "username"), Some("placement"));
    }
}
