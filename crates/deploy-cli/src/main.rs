//! CLI binary driving the placement service deployment lifecycle.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use placement_deploy::{
    Collaborators, DatabaseBackend, DatabaseSettings, DeploymentOptions, DeploymentSpec,
    LifecycleController, SERVICE_NAME, TlsSettings, VirtualEnv,
};
use placement_deploy_host::{
    Apache, ApacheOptions, OpenStackCli, Pip, PlacementManage, SqlDatabaseAdmin, Systemd,
    SystemdOptions,
};
use placement_deploy_mock::MockHost;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use url::Url;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Deployment library error
    #[error(transparent)]
    Deploy(#[from] placement_deploy::Error),

    /// TLS was enabled without the named file
    #[error("tls is enabled but {0} is not set")]
    MissingTlsFile(&'static str),
}

/// A lifecycle phase to run.
#[derive(Clone, Copy, Debug, Subcommand)]
enum Phase {
    /// Install the web server WSGI support and the client plugin
    Install,

    /// Write the service config and the backend config
    Configure,

    /// Sync the database and register the service with identity
    Init,

    /// Launch the backend and wait until it responds
    Start,

    /// Stop the running backend
    Stop,

    /// Remove generated backend config
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Install => "install",
            Self::Configure => "configure",
            Self::Init => "init",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Cleanup => "cleanup",
        };

        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DatabaseType {
    Mysql,
    Postgresql,
}

impl From<DatabaseType> for DatabaseBackend {
    fn from(value: DatabaseType) -> Self {
        match value {
            DatabaseType::Mysql => Self::Mysql,
            DatabaseType::Postgresql => Self::Postgresql,
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
#[allow(clippy::struct_excessive_bools)]
struct Args {
    /// Number of API worker processes
    #[arg(long, default_value_t = 2, env = "API_WORKERS")]
    api_workers: u32,

    /// Web server name, used for its service, config and log paths
    #[arg(long, default_value = "apache2", env = "APACHE_NAME")]
    apache_name: String,

    /// Identity service URL
    #[arg(
        long,
        default_value = "http://127.0.0.1/identity",
        env = "KEYSTONE_SERVICE_URI"
    )]
    auth_url: Url,

    /// Directory holding the service executables outside a virtualenv
    #[arg(long, default_value = "/usr/local/bin", env = "PLACEMENT_BIN_DIR")]
    bin_dir: PathBuf,

    /// Client plugin package installed for CLI access
    #[arg(long, default_value = "osc-placement")]
    client_plugin: String,

    /// Directory for generated service config
    #[arg(long, default_value = "/etc/placement", env = "PLACEMENT_CONF_DIR")]
    conf_dir: PathBuf,

    /// Whether the dedicated database is used
    #[arg(
        long,
        default_value_t = false,
        env = "PLACEMENT_DB_ENABLED",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    database_enabled: bool,

    /// Database server host
    #[arg(long, default_value = "127.0.0.1", env = "DATABASE_HOST")]
    database_host: String,

    /// Name of the dedicated database
    #[arg(long, default_value = "placement")]
    database_name: String,

    /// Database admin password
    #[arg(long, default_value = "", env = "DATABASE_PASSWORD", hide_env_values = true)]
    database_password: String,

    /// Whether init drops and recreates the database before syncing
    #[arg(
        long,
        default_value_t = true,
        env = "PLACEMENT_DB_RESET",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    database_reset: bool,

    /// Database server flavour
    #[arg(long, value_enum, default_value_t = DatabaseType::Mysql, env = "DATABASE_TYPE")]
    database_type: DatabaseType,

    /// Database admin user
    #[arg(long, default_value = "root", env = "DATABASE_USER")]
    database_user: String,

    /// Run against an in-memory host instead of the real one
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Whether the service logs at debug level
    #[arg(
        long,
        default_value_t = true,
        env = "ENABLE_DEBUG_LOG_LEVEL",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    debug: bool,

    /// Named cloud in clouds.yaml used for identity calls
    #[arg(long, env = "OS_CLOUD")]
    os_cloud: Option<String>,

    /// Milliseconds between readiness probes
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Interpreter directory name inside the virtualenv
    #[arg(long, default_value = "python3.12", env = "PYTHON_VERSION")]
    python_version: String,

    /// Region the endpoint is registered in
    #[arg(long, default_value = "RegionOne", env = "REGION_NAME")]
    region: String,

    /// Domain of the service account and project
    #[arg(long, default_value = "Default", env = "SERVICE_DOMAIN_NAME")]
    service_domain: String,

    /// Public host of the service
    #[arg(long, default_value = "127.0.0.1", env = "PLACEMENT_SERVICE_HOST")]
    service_host: String,

    /// Password of the service account
    #[arg(long, env = "SERVICE_PASSWORD", hide_env_values = true)]
    service_password: String,

    /// Project the service account belongs to
    #[arg(long, default_value = "service", env = "SERVICE_PROJECT_NAME")]
    service_project: String,

    /// Role granted to the service account
    #[arg(long, default_value = "admin")]
    service_role: String,

    /// Seconds start waits for the service to respond
    #[arg(long, default_value_t = 60, env = "SERVICE_TIMEOUT")]
    service_timeout: u64,

    /// Template overriding the built-in site config template
    #[arg(long, env = "PLACEMENT_SITE_TEMPLATE")]
    site_template: Option<PathBuf>,

    /// TLS certificate file
    #[arg(long, env = "PLACEMENT_SSL_CERT")]
    ssl_cert: Option<PathBuf>,

    /// TLS private key file
    #[arg(long, env = "PLACEMENT_SSL_KEY")]
    ssl_key: Option<PathBuf>,

    /// User the service runs as
    #[arg(long, default_value = "stack", env = "STACK_USER")]
    stack_user: String,

    /// Directory for persisted lifecycle state
    #[arg(
        long,
        default_value = "/var/lib/placement-deploy",
        env = "PLACEMENT_STATE_DIR"
    )]
    state_dir: PathBuf,

    /// Whether privileged host commands run through sudo
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    sudo: bool,

    /// Whether the public endpoint is served over https
    #[arg(
        long,
        default_value_t = false,
        env = "PLACEMENT_TLS_ENABLED",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    tls_enabled: bool,

    /// Directory systemd unit files are written to
    #[arg(long, default_value = "/etc/systemd/system")]
    unit_dir: PathBuf,

    /// Prefix of the systemd unit names
    #[arg(long, default_value = "devstack@")]
    unit_prefix: String,

    /// Directory for the embedded server's socket
    #[arg(long, default_value = "/var/run/uwsgi")]
    uwsgi_socket_dir: PathBuf,

    /// Virtual environment the service is installed into
    #[arg(long, env = "PLACEMENT_VENV")]
    venv: Option<PathBuf>,

    /// WSGI execution mode; `uwsgi` runs the embedded server
    #[arg(long, default_value = "uwsgi", env = "WSGI_MODE")]
    wsgi_mode: String,

    #[command(subcommand)]
    phase: Phase,
}

impl Args {
    fn database_settings(&self) -> DatabaseSettings {
        DatabaseSettings {
            backend: self.database_type.into(),
            host: self.database_host.clone(),
            user: self.database_user.clone(),
            password: self.database_password.clone(),
            name: self.database_name.clone(),
            reset_on_init: self.database_reset,
        }
    }

    fn tls_settings(&self) -> Result<Option<TlsSettings>, Error> {
        if !self.tls_enabled {
            return Ok(None);
        }

        let cert_file = self
            .ssl_cert
            .clone()
            .ok_or(Error::MissingTlsFile("PLACEMENT_SSL_CERT"))?;
        let key_file = self
            .ssl_key
            .clone()
            .ok_or(Error::MissingTlsFile("PLACEMENT_SSL_KEY"))?;

        Ok(Some(TlsSettings {
            cert_file,
            key_file,
        }))
    }

    fn deployment_options(&self) -> Result<DeploymentOptions, Error> {
        Ok(DeploymentOptions {
            api_workers: self.api_workers,
            auth_strategy: "keystone".to_string(),
            auth_url: self.auth_url.clone(),
            bin_dir: self.bin_dir.clone(),
            client_plugin: self.client_plugin.clone(),
            conf_dir: self.conf_dir.clone(),
            database: self.database_enabled.then(|| self.database_settings()),
            debug: self.debug,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            region: self.region.clone(),
            service_role: self.service_role.clone(),
            service_host: self.service_host.clone(),
            service_domain: self.service_domain.clone(),
            service_password: self.service_password.clone(),
            service_project: self.service_project.clone(),
            service_timeout: Duration::from_secs(self.service_timeout),
            site_template: self.site_template.clone(),
            stack_user: self.stack_user.clone(),
            state_dir: self.state_dir.clone(),
            tls: self.tls_settings()?,
            uwsgi_socket_dir: self.uwsgi_socket_dir.clone(),
            venv: self.venv.clone().map(|root| VirtualEnv {
                root,
                python_version: self.python_version.clone(),
            }),
            web_server_name: self.apache_name.clone(),
            wsgi_mode: self.wsgi_mode.clone(),
        })
    }

    fn collaborators(&self, spec: &DeploymentSpec) -> Collaborators {
        if self.dry_run {
            let sites_dir = self.state_dir.join("dry-run-sites");
            info!("dry run, site configs go to {}", sites_dir.display());
            return MockHost::new(sites_dir).collaborators();
        }

        // Packages inside a virtualenv belong to the stack user.
        let pip_sudo = self.sudo && spec.venv().is_none();

        Collaborators {
            packages: Arc::new(Pip::new(spec.bin_dir().join("pip"), pip_sudo)),
            web_server: Arc::new(Apache::new(ApacheOptions::with_name(
                &self.apache_name,
                self.sudo,
            ))),
            processes: Arc::new(Systemd::new(SystemdOptions {
                unit_dir: self.unit_dir.clone(),
                unit_prefix: self.unit_prefix.clone(),
                user: self.stack_user.clone(),
                sudo: self.sudo,
            })),
            identity: Arc::new(OpenStackCli::new(self.os_cloud.clone())),
            database: Arc::new(SqlDatabaseAdmin::new(&self.database_settings())),
            migrations: Arc::new(PlacementManage::new(&spec.bin_dir(), spec.conf_file())),
        }
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let spec = Arc::new(DeploymentSpec::new(args.deployment_options()?)?);
    let controller = LifecycleController::new(spec.clone(), args.collaborators(&spec))?;

    match args.phase {
        Phase::Install => controller.install().await?,
        Phase::Configure => controller.configure().await?,
        Phase::Init => {
            let registration = controller.init().await?;
            info!(
                "{} registered as user {} with endpoint {}",
                SERVICE_NAME, registration.user_id, registration.endpoint_id
            );
        }
        Phase::Start => controller.start().await?,
        Phase::Stop => controller.stop().await?,
        Phase::Cleanup => controller.cleanup().await?,
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let phase = args.phase;

    match run(args).await {
        Ok(()) => {
            info!("{} {} complete", SERVICE_NAME, phase);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{} {} failed: {}", SERVICE_NAME, phase, e);
            ExitCode::FAILURE
        }
    }
}
