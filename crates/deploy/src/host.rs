//! Interfaces of the external tools the lifecycle drives.
//!
//! Every call is awaited to completion before the next one is made; none of
//! these are expected to be invoked concurrently for the same deployment.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BoxError;

/// Installs packages the service needs.
#[async_trait]
pub trait PackageInstaller: Send + Sync + 'static {
    /// Installs a Python package, doing nothing if it is already present.
    async fn install_python_package(&self, name: &str) -> Result<(), BoxError>;
}

/// Controls the shared reverse-proxy web server.
#[async_trait]
pub trait WebServer: Send + Sync + 'static {
    /// Path of the config file for `site`.
    fn site_config_path(&self, site: &str) -> PathBuf;

    /// Path of the log file `site` writes to.
    fn site_log_path(&self, site: &str) -> PathBuf;

    /// Ensures the web server and its WSGI integration are installed.
    async fn install_wsgi(&self) -> Result<(), BoxError>;

    /// Ensures the web server can proxy requests to a uWSGI socket.
    async fn install_uwsgi_proxy(&self) -> Result<(), BoxError>;

    /// Enables `site`.
    async fn enable_site(&self, site: &str) -> Result<(), BoxError>;

    /// Disables `site`.
    async fn disable_site(&self, site: &str) -> Result<(), BoxError>;

    /// Restarts the whole web server, affecting every site it serves.
    async fn restart(&self) -> Result<(), BoxError>;
}

/// Supervises long-running processes by name.
#[async_trait]
pub trait ProcessManager: Send + Sync + 'static {
    /// Runs `command` under supervision as `name`.
    async fn run(&self, name: &str, command: &[String]) -> Result<(), BoxError>;

    /// Stops the process supervised as `name`.
    async fn stop(&self, name: &str) -> Result<(), BoxError>;

    /// Follows `log` under supervision as `name`.
    async fn tail_log(&self, name: &str, log: &Path) -> Result<(), BoxError>;
}

/// An endpoint record in the service catalog.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Endpoint {
    /// Endpoint id.
    pub id: String,

    /// Registered URL.
    pub url: String,
}

/// Reads and writes identity and catalog records.
///
/// `find_*` methods return `Ok(None)` for absent records; errors are reserved
/// for failures talking to the identity service.
#[async_trait]
pub trait IdentityClient: Send + Sync + 'static {
    /// Looks up a user by name within a domain, returning its id.
    async fn find_user(&self, name: &str, domain: &str) -> Result<Option<String>, BoxError>;

    /// Creates a user, returning its id.
    async fn create_user(
        &self,
        name: &str,
        password: &str,
        domain: &str,
    ) -> Result<String, BoxError>;

    /// Whether the user holds `role` on `project`.
    async fn has_role(
        &self,
        user_id: &str,
        project: &str,
        domain: &str,
        role: &str,
    ) -> Result<bool, BoxError>;

    /// Grants `role` on `project` to the user.
    async fn add_role(
        &self,
        user_id: &str,
        project: &str,
        domain: &str,
        role: &str,
    ) -> Result<(), BoxError>;

    /// Looks up a catalog service by name and type, returning its id.
    async fn find_service(&self, name: &str, service_type: &str)
    -> Result<Option<String>, BoxError>;

    /// Creates a catalog service, returning its id.
    async fn create_service(
        &self,
        name: &str,
        service_type: &str,
        description: &str,
    ) -> Result<String, BoxError>;

    /// Looks up the endpoint of a service for an interface and region.
    async fn find_endpoint(
        &self,
        service_id: &str,
        interface: &str,
        region: &str,
    ) -> Result<Option<Endpoint>, BoxError>;

    /// Creates an endpoint, returning its id.
    async fn create_endpoint(
        &self,
        service_id: &str,
        interface: &str,
        region: &str,
        url: &str,
    ) -> Result<String, BoxError>;
}

/// Administers the database server.
#[async_trait]
pub trait DatabaseAdmin: Send + Sync + 'static {
    /// Drops `name` if it exists and creates it empty.
    async fn recreate_database(&self, name: &str) -> Result<(), BoxError>;
}

/// Brings the database schema up to date.
#[async_trait]
pub trait MigrationRunner: Send + Sync + 'static {
    /// Runs schema synchronization to completion.
    async fn sync_schema(&self) -> Result<(), BoxError>;
}

/// The set of collaborators a lifecycle controller drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Package manager.
    pub packages: Arc<dyn PackageInstaller>,

    /// Shared web server.
    pub web_server: Arc<dyn WebServer>,

    /// Process supervisor.
    pub processes: Arc<dyn ProcessManager>,

    /// Identity service client.
    pub identity: Arc<dyn IdentityClient>,

    /// Database administration.
    pub database: Arc<dyn DatabaseAdmin>,

    /// Schema migration runner.
    pub migrations: Arc<dyn MigrationRunner>,
}
