//! Immutable description of one deployment, built once and shared by every phase.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::BackendMode;
use crate::error::{Error, Result};

/// Name of the service, its catalog entry and its account.
pub const SERVICE_NAME: &str = "placement";

/// Name of the supervised process and of the web-server site.
pub const PROCESS_NAME: &str = "placement-api";

/// Public protocol of the service.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain HTTP.
    Http,

    /// HTTP over TLS.
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Https => write!(f, "https"),
        }
    }
}

/// Identity of the deployed service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceDescriptor {
    /// Service name.
    pub name: String,

    /// Public protocol.
    pub protocol: Protocol,

    /// Public host, optionally with a port.
    pub host: String,

    /// Path prefix the API is served under.
    pub base_path: String,

    /// Auth strategy written into the service config.
    pub auth_strategy: String,
}

impl ServiceDescriptor {
    /// Public URL of the API, polled on start and registered in the catalog.
    #[must_use]
    pub fn public_url(&self) -> String {
        format!("{}://{}/{}", self.protocol, self.host, self.base_path)
    }
}

/// Credentials the service uses to validate tokens against the identity service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceCredentials {
    /// Auth plugin type.
    pub auth_type: String,

    /// Identity service URL.
    pub auth_url: Url,

    /// Service account name.
    pub username: String,

    /// Service account password.
    pub password: String,

    /// Domain of the service account.
    pub user_domain_name: String,

    /// Project the service account is scoped to.
    pub project_name: String,

    /// Domain of that project.
    pub project_domain_name: String,
}

/// Supported database servers.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    /// `MySQL` or `MariaDB`.
    Mysql,

    /// `PostgreSQL`.
    Postgresql,
}

/// Settings for the dedicated database. Present only when the feature is enabled.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DatabaseSettings {
    /// Database server flavour.
    pub backend: DatabaseBackend,

    /// Database server host.
    pub host: String,

    /// Admin user.
    pub user: String,

    /// Admin password.
    pub password: String,

    /// Name of the dedicated database.
    pub name: String,

    /// Whether `init` drops and recreates the database before syncing.
    pub reset_on_init: bool,
}

impl DatabaseSettings {
    /// Connection URL written into the service config.
    ///
    /// User and password are percent-encoded, so any characters are allowed in them.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not form a valid URL.
    pub fn connection_url(&self) -> Result<String> {
        let (scheme, query) = match self.backend {
            DatabaseBackend::Mysql => ("mysql+pymysql", "charset=utf8"),
            DatabaseBackend::Postgresql => ("postgresql", "client_encoding=utf8"),
        };
        let invalid = |reason: String| Error::InvalidOption("database", reason);

        let mut url = Url::parse(&format!("{scheme}://{}/", self.host))
            .map_err(|e| invalid(format!("invalid host {:?}: {e}", self.host)))?;

        url.set_username(&self.user)
            .map_err(|()| invalid(format!("cannot use user {:?}", self.user)))?;
        url.set_password(Some(&self.password))
            .map_err(|()| invalid("cannot use password".to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid(format!("invalid host {:?}", self.host)))?
            .pop_if_empty()
            .push(&self.name);
        url.set_query(Some(query));

        Ok(url.into())
    }
}

/// TLS material for the proxied site.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TlsSettings {
    /// Certificate file.
    pub cert_file: PathBuf,

    /// Private key file.
    pub key_file: PathBuf,
}

/// A Python virtual environment the service is installed into.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VirtualEnv {
    /// Root of the environment.
    pub root: PathBuf,

    /// Interpreter directory name under `lib/`, e.g. `python3.12`.
    pub python_version: String,
}

impl VirtualEnv {
    /// Directory holding the environment's executables.
    #[must_use]
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// The environment's `site-packages` directory.
    #[must_use]
    pub fn site_packages(&self) -> PathBuf {
        self.root
            .join("lib")
            .join(&self.python_version)
            .join("site-packages")
    }
}

/// Options for building a `DeploymentSpec`.
#[derive(Clone, Debug)]
pub struct DeploymentOptions {
    /// Number of API worker processes.
    pub api_workers: u32,

    /// Auth strategy of the API.
    pub auth_strategy: String,

    /// Identity service URL.
    pub auth_url: Url,

    /// Directory holding the service's executables when no virtualenv is used.
    pub bin_dir: PathBuf,

    /// Name of the client plugin package installed for CLI access.
    pub client_plugin: String,

    /// Directory for generated service config.
    pub conf_dir: PathBuf,

    /// Dedicated database settings; `None` disables the database feature.
    pub database: Option<DatabaseSettings>,

    /// Whether debug logging is enabled in the service.
    pub debug: bool,

    /// Interval between readiness probes.
    pub poll_interval: Duration,

    /// Region the endpoint is registered in.
    pub region: String,

    /// Role granted to the service account.
    pub service_role: String,

    /// Public host of the service.
    pub service_host: String,

    /// Domain of the service account and project.
    pub service_domain: String,

    /// Password of the service account.
    pub service_password: String,

    /// Project the service account belongs to.
    pub service_project: String,

    /// How long `start` waits for the service to respond.
    pub service_timeout: Duration,

    /// Template overriding the built-in site config template.
    pub site_template: Option<PathBuf>,

    /// User the service runs as.
    pub stack_user: String,

    /// Directory for persisted lifecycle state.
    pub state_dir: PathBuf,

    /// TLS material; `Some` switches the public protocol to https.
    pub tls: Option<TlsSettings>,

    /// Directory for the embedded server's socket.
    pub uwsgi_socket_dir: PathBuf,

    /// Virtual environment, if the service is installed into one.
    pub venv: Option<VirtualEnv>,

    /// Name of the shared web server, used in its log paths.
    pub web_server_name: String,

    /// The WSGI execution-mode setting.
    pub wsgi_mode: String,
}

/// Immutable description of a deployment.
#[derive(Clone, Debug)]
pub struct DeploymentSpec {
    api_workers: u32,
    backend_mode: BackendMode,
    bin_dir: PathBuf,
    client_plugin: String,
    conf_dir: PathBuf,
    credentials: ServiceCredentials,
    database: Option<DatabaseSettings>,
    debug: bool,
    poll_interval: Duration,
    region: String,
    service: ServiceDescriptor,
    service_role: String,
    service_timeout: Duration,
    site_template: Option<PathBuf>,
    stack_user: String,
    state_dir: PathBuf,
    tls: Option<TlsSettings>,
    uwsgi_socket_dir: PathBuf,
    venv: Option<VirtualEnv>,
    web_server_name: String,
}

impl DeploymentSpec {
    /// Builds the spec, selecting the backend mode and public protocol once.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker count is zero, the poll interval is zero,
    /// the service host is empty, or the database settings do not form a
    /// connection URL.
    pub fn new(
        DeploymentOptions {
            api_workers,
            auth_strategy,
            auth_url,
            bin_dir,
            client_plugin,
            conf_dir,
            database,
            debug,
            poll_interval,
            region,
            service_role,
            service_host,
            service_domain,
            service_password,
            service_project,
            service_timeout,
            site_template,
            stack_user,
            state_dir,
            tls,
            uwsgi_socket_dir,
            venv,
            web_server_name,
            wsgi_mode,
        }: DeploymentOptions,
    ) -> Result<Self> {
        if api_workers == 0 {
            return Err(Error::InvalidOption(
                "api_workers",
                "must be at least 1".to_string(),
            ));
        }

        if poll_interval.is_zero() {
            return Err(Error::InvalidOption(
                "poll_interval",
                "must be greater than zero".to_string(),
            ));
        }

        if service_host.trim().is_empty() {
            return Err(Error::InvalidOption(
                "service_host",
                "must not be empty".to_string(),
            ));
        }

        if let Some(settings) = &database {
            settings.connection_url()?;
        }

        let protocol = if tls.is_some() {
            Protocol::Https
        } else {
            Protocol::Http
        };

        Ok(Self {
            api_workers,
            backend_mode: BackendMode::select(&wsgi_mode),
            bin_dir,
            client_plugin,
            conf_dir,
            credentials: ServiceCredentials {
                auth_type: "password".to_string(),
                auth_url,
                username: SERVICE_NAME.to_string(),
                password: service_password,
                user_domain_name: service_domain.clone(),
                project_name: service_project,
                project_domain_name: service_domain,
            },
            database,
            debug,
            poll_interval,
            region,
            service: ServiceDescriptor {
                name: SERVICE_NAME.to_string(),
                protocol,
                host: service_host,
                base_path: SERVICE_NAME.to_string(),
                auth_strategy,
            },
            service_role,
            service_timeout,
            site_template,
            stack_user,
            state_dir,
            tls,
            uwsgi_socket_dir,
            venv,
            web_server_name,
        })
    }

    /// Number of API worker processes.
    #[must_use]
    pub const fn api_workers(&self) -> u32 {
        self.api_workers
    }

    /// Backend mode selected when the spec was built.
    #[must_use]
    pub const fn backend_mode(&self) -> BackendMode {
        self.backend_mode
    }

    /// Directory holding the service's executables, inside the virtualenv if one is used.
    #[must_use]
    pub fn bin_dir(&self) -> PathBuf {
        self.venv
            .as_ref()
            .map_or_else(|| self.bin_dir.clone(), VirtualEnv::bin_dir)
    }

    /// Client plugin package name.
    #[must_use]
    pub fn client_plugin(&self) -> &str {
        &self.client_plugin
    }

    /// Directory for generated service config.
    #[must_use]
    pub fn conf_dir(&self) -> &Path {
        &self.conf_dir
    }

    /// The shared service config file.
    #[must_use]
    pub fn conf_file(&self) -> PathBuf {
        self.conf_dir.join(format!("{SERVICE_NAME}.conf"))
    }

    /// Identity credentials for the service.
    #[must_use]
    pub const fn credentials(&self) -> &ServiceCredentials {
        &self.credentials
    }

    /// Dedicated database settings, if the feature is enabled.
    #[must_use]
    pub const fn database(&self) -> Option<&DatabaseSettings> {
        self.database.as_ref()
    }

    /// Whether debug logging is enabled in the service.
    #[must_use]
    pub const fn debug(&self) -> bool {
        self.debug
    }

    /// Interval between readiness probes.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Name of the supervised process.
    #[must_use]
    pub const fn process_name(&self) -> &'static str {
        PROCESS_NAME
    }

    /// Public WSGI entry point of the service.
    #[must_use]
    pub fn public_wsgi(&self) -> PathBuf {
        self.bin_dir().join(PROCESS_NAME)
    }

    /// Region the endpoint is registered in.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The deployed service.
    #[must_use]
    pub const fn service(&self) -> &ServiceDescriptor {
        &self.service
    }

    /// Role granted to the service account.
    #[must_use]
    pub fn service_role(&self) -> &str {
        &self.service_role
    }

    /// How long `start` waits for the service to respond.
    #[must_use]
    pub const fn service_timeout(&self) -> Duration {
        self.service_timeout
    }

    /// Name of the web-server site in proxied mode.
    #[must_use]
    pub const fn site_name(&self) -> &'static str {
        PROCESS_NAME
    }

    /// Template overriding the built-in site config template.
    #[must_use]
    pub fn site_template(&self) -> Option<&Path> {
        self.site_template.as_deref()
    }

    /// User the service runs as.
    #[must_use]
    pub fn stack_user(&self) -> &str {
        &self.stack_user
    }

    /// Directory for persisted lifecycle state.
    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// TLS material, if TLS is enabled.
    #[must_use]
    pub const fn tls(&self) -> Option<&TlsSettings> {
        self.tls.as_ref()
    }

    /// Config file of the embedded application server.
    #[must_use]
    pub fn uwsgi_conf_file(&self) -> PathBuf {
        self.conf_dir.join(format!("{SERVICE_NAME}-uwsgi.ini"))
    }

    /// Socket the embedded application server listens on.
    #[must_use]
    pub fn uwsgi_socket(&self) -> PathBuf {
        self.uwsgi_socket_dir.join(format!("{PROCESS_NAME}.socket"))
    }

    /// Virtual environment, if the service is installed into one.
    #[must_use]
    pub const fn venv(&self) -> Option<&VirtualEnv> {
        self.venv.as_ref()
    }

    /// Name of the shared web server.
    #[must_use]
    pub fn web_server_name(&self) -> &str {
        &self.web_server_name
    }
}
