//! In-memory collaborators for exercising the placement lifecycle without a host.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use placement_deploy::host::{
    DatabaseAdmin, Endpoint, IdentityClient, MigrationRunner, PackageInstaller, ProcessManager,
    WebServer,
};
use placement_deploy::{BoxError, Collaborators};
use tracing::debug;

/// Operations that can be made to fail.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Failure {
    /// `WebServer::install_wsgi` and `WebServer::install_uwsgi_proxy`.
    InstallWsgi,

    /// `PackageInstaller::install_python_package`.
    InstallPackage,

    /// `ProcessManager::run`.
    RunProcess,

    /// `WebServer::enable_site`.
    EnableSite,

    /// `WebServer::restart`.
    Restart,

    /// `ProcessManager::tail_log`.
    TailLog,

    /// `DatabaseAdmin::recreate_database`.
    RecreateDatabase,

    /// `MigrationRunner::sync_schema`.
    SyncSchema,

    /// Every `IdentityClient` call.
    Identity,
}

/// A user held by the mock identity service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MockUser {
    /// User id.
    pub id: String,

    /// User name.
    pub name: String,

    /// User domain.
    pub domain: String,
}

/// A catalog service held by the mock identity service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MockService {
    /// Service id.
    pub id: String,

    /// Service name.
    pub name: String,

    /// Service type.
    pub service_type: String,

    /// Service description.
    pub description: String,
}

/// An endpoint held by the mock identity service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MockEndpoint {
    /// Endpoint id.
    pub id: String,

    /// Owning service id.
    pub service_id: String,

    /// Endpoint interface.
    pub interface: String,

    /// Endpoint region.
    pub region: String,

    /// Endpoint URL.
    pub url: String,
}

#[derive(Default)]
struct HostState {
    enabled_sites: BTreeSet<String>,
    endpoints: Vec<MockEndpoint>,
    events: Vec<String>,
    failures: BTreeSet<Failure>,
    next_id: u64,
    packages: BTreeSet<String>,
    processes: BTreeMap<String, Vec<String>>,
    recreated_databases: Vec<String>,
    restarts: usize,
    roles: BTreeSet<(String, String, String, String)>,
    schema_syncs: usize,
    services: Vec<MockService>,
    users: Vec<MockUser>,
    uwsgi_proxy_installed: bool,
    wsgi_installed: bool,
}

impl HostState {
    fn check(&self, failure: Failure) -> Result<(), BoxError> {
        if self.failures.contains(&failure) {
            return Err(Box::new(Error::Injected(failure)));
        }

        Ok(())
    }

    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

/// A fake host implementing every collaborator trait against shared memory.
#[derive(Clone)]
pub struct MockHost {
    site_dir: PathBuf,
    state: Arc<Mutex<HostState>>,
}

impl MockHost {
    /// Creates a mock host whose web-server sites live in `site_dir`.
    #[must_use]
    pub fn new(site_dir: impl Into<PathBuf>) -> Self {
        Self {
            site_dir: site_dir.into(),
            state: Arc::new(Mutex::new(HostState::default())),
        }
    }

    /// Collaborators backed by this host.
    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            packages: Arc::new(self.clone()),
            web_server: Arc::new(self.clone()),
            processes: Arc::new(self.clone()),
            identity: Arc::new(self.clone()),
            database: Arc::new(self.clone()),
            migrations: Arc::new(self.clone()),
        }
    }

    /// Makes every later call of `failure`'s operation fail.
    pub fn fail(&self, failure: Failure) {
        self.state.lock().failures.insert(failure);
    }

    /// Stops injecting `failure`.
    pub fn recover(&self, failure: Failure) {
        self.state.lock().failures.remove(&failure);
    }

    /// Names of every call made so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.state.lock().events.clone()
    }

    /// Installed Python packages.
    #[must_use]
    pub fn packages(&self) -> Vec<String> {
        self.state.lock().packages.iter().cloned().collect()
    }

    /// Whether the web server's WSGI integration was installed.
    #[must_use]
    pub fn wsgi_installed(&self) -> bool {
        self.state.lock().wsgi_installed
    }

    /// Whether the web server's uWSGI proxy integration was installed.
    #[must_use]
    pub fn uwsgi_proxy_installed(&self) -> bool {
        self.state.lock().uwsgi_proxy_installed
    }

    /// Currently enabled sites.
    #[must_use]
    pub fn enabled_sites(&self) -> Vec<String> {
        self.state.lock().enabled_sites.iter().cloned().collect()
    }

    /// Number of web-server restarts.
    #[must_use]
    pub fn restarts(&self) -> usize {
        self.state.lock().restarts
    }

    /// Command of the process supervised as `name`, if it is running.
    #[must_use]
    pub fn process(&self, name: &str) -> Option<Vec<String>> {
        self.state.lock().processes.get(name).cloned()
    }

    /// Names of running supervised processes.
    #[must_use]
    pub fn running_processes(&self) -> Vec<String> {
        self.state.lock().processes.keys().cloned().collect()
    }

    /// Users in the identity service.
    #[must_use]
    pub fn users(&self) -> Vec<MockUser> {
        self.state.lock().users.clone()
    }

    /// Role assignments as `(user_id, project, domain, role)`.
    #[must_use]
    pub fn role_assignments(&self) -> Vec<(String, String, String, String)> {
        self.state.lock().roles.iter().cloned().collect()
    }

    /// Catalog services in the identity service.
    #[must_use]
    pub fn services(&self) -> Vec<MockService> {
        self.state.lock().services.clone()
    }

    /// Endpoints in the identity service.
    #[must_use]
    pub fn endpoints(&self) -> Vec<MockEndpoint> {
        self.state.lock().endpoints.clone()
    }

    /// Databases recreated so far, in order.
    #[must_use]
    pub fn recreated_databases(&self) -> Vec<String> {
        self.state.lock().recreated_databases.clone()
    }

    /// Number of completed schema synchronizations.
    #[must_use]
    pub fn schema_syncs(&self) -> usize {
        self.state.lock().schema_syncs
    }

    fn record(&self, event: String) -> parking_lot::MutexGuard<'_, HostState> {
        debug!("mock host: {}", event);

        let mut state = self.state.lock();
        state.events.push(event);
        state
    }
}

#[async_trait]
impl PackageInstaller for MockHost {
    async fn install_python_package(&self, name: &str) -> Result<(), BoxError> {
        let mut state = self.record(format!("install_python_package {name}"));
        state.check(Failure::InstallPackage)?;
        state.packages.insert(name.to_string());

        Ok(())
    }
}

#[async_trait]
impl WebServer for MockHost {
    fn site_config_path(&self, site: &str) -> PathBuf {
        self.site_dir.join(format!("{site}.conf"))
    }

    fn site_log_path(&self, site: &str) -> PathBuf {
        self.site_dir.join(format!("{site}.log"))
    }

    async fn install_wsgi(&self) -> Result<(), BoxError> {
        let mut state = self.record("install_wsgi".to_string());
        state.check(Failure::InstallWsgi)?;
        state.wsgi_installed = true;

        Ok(())
    }

    async fn install_uwsgi_proxy(&self) -> Result<(), BoxError> {
        let mut state = self.record("install_uwsgi_proxy".to_string());
        state.check(Failure::InstallWsgi)?;
        state.uwsgi_proxy_installed = true;

        Ok(())
    }

    async fn enable_site(&self, site: &str) -> Result<(), BoxError> {
        let mut state = self.record(format!("enable_site {site}"));
        state.check(Failure::EnableSite)?;
        state.enabled_sites.insert(site.to_string());

        Ok(())
    }

    async fn disable_site(&self, site: &str) -> Result<(), BoxError> {
        let mut state = self.record(format!("disable_site {site}"));
        state.enabled_sites.remove(site);

        Ok(())
    }

    async fn restart(&self) -> Result<(), BoxError> {
        let mut state = self.record("restart".to_string());
        state.check(Failure::Restart)?;
        state.restarts += 1;

        Ok(())
    }
}

#[async_trait]
impl ProcessManager for MockHost {
    async fn run(&self, name: &str, command: &[String]) -> Result<(), BoxError> {
        let mut state = self.record(format!("run {name}"));
        state.check(Failure::RunProcess)?;
        state.processes.insert(name.to_string(), command.to_vec());

        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), BoxError> {
        let mut state = self.record(format!("stop {name}"));
        state.processes.remove(name);

        Ok(())
    }

    async fn tail_log(&self, name: &str, log: &Path) -> Result<(), BoxError> {
        let mut state = self.record(format!("tail_log {name}"));
        state.check(Failure::TailLog)?;
        state.processes.insert(
            name.to_string(),
            vec!["tail".to_string(), "-F".to_string(), log.display().to_string()],
        );

        Ok(())
    }
}

#[async_trait]
impl IdentityClient for MockHost {
    async fn find_user(&self, name: &str, domain: &str) -> Result<Option<String>, BoxError> {
        let state = self.record(format!("find_user {name}"));
        state.check(Failure::Identity)?;

        Ok(state
            .users
            .iter()
            .find(|u| u.name == name && u.domain == domain)
            .map(|u| u.id.clone()))
    }

    async fn create_user(
        &self,
        name: &str,
        _password: &str,
        domain: &str,
    ) -> Result<String, BoxError> {
        let mut state = self.record(format!("create_user {name}"));
        state.check(Failure::Identity)?;

        let id = state.id("user");
        state.users.push(MockUser {
            id: id.clone(),
            name: name.to_string(),
            domain: domain.to_string(),
        });

        Ok(id)
    }

    async fn has_role(
        &self,
        user_id: &str,
        project: &str,
        domain: &str,
        role: &str,
    ) -> Result<bool, BoxError> {
        let state = self.record(format!("has_role {user_id} {role}"));
        state.check(Failure::Identity)?;

        Ok(state.roles.contains(&(
            user_id.to_string(),
            project.to_string(),
            domain.to_string(),
            role.to_string(),
        )))
    }

    async fn add_role(
        &self,
        user_id: &str,
        project: &str,
        domain: &str,
        role: &str,
    ) -> Result<(), BoxError> {
        let mut state = self.record(format!("add_role {user_id} {role}"));
        state.check(Failure::Identity)?;
        state.roles.insert((
            user_id.to_string(),
            project.to_string(),
            domain.to_string(),
            role.to_string(),
        ));

        Ok(())
    }

    async fn find_service(
        &self,
        name: &str,
        service_type: &str,
    ) -> Result<Option<String>, BoxError> {
        let state = self.record(format!("find_service {name}"));
        state.check(Failure::Identity)?;

        Ok(state
            .services
            .iter()
            .find(|s| s.name == name && s.service_type == service_type)
            .map(|s| s.id.clone()))
    }

    async fn create_service(
        &self,
        name: &str,
        service_type: &str,
        description: &str,
    ) -> Result<String, BoxError> {
        let mut state = self.record(format!("create_service {name}"));
        state.check(Failure::Identity)?;

        let id = state.id("service");
        state.services.push(MockService {
            id: id.clone(),
            name: name.to_string(),
            service_type: service_type.to_string(),
            description: description.to_string(),
        });

        Ok(id)
    }

    async fn find_endpoint(
        &self,
        service_id: &str,
        interface: &str,
        region: &str,
    ) -> Result<Option<Endpoint>, BoxError> {
        let state = self.record(format!("find_endpoint {service_id}"));
        state.check(Failure::Identity)?;

        Ok(state
            .endpoints
            .iter()
            .find(|e| e.service_id == service_id && e.interface == interface && e.region == region)
            .map(|e| Endpoint {
                id: e.id.clone(),
                url: e.url.clone(),
            }))
    }

    async fn create_endpoint(
        &self,
        service_id: &str,
        interface: &str,
        region: &str,
        url: &str,
    ) -> Result<String, BoxError> {
        let mut state = self.record(format!("create_endpoint {service_id}"));
        state.check(Failure::Identity)?;

        let id = state.id("endpoint");
        state.endpoints.push(MockEndpoint {
            id: id.clone(),
            service_id: service_id.to_string(),
            interface: interface.to_string(),
            region: region.to_string(),
            url: url.to_string(),
        });

        Ok(id)
    }
}

#[async_trait]
impl DatabaseAdmin for MockHost {
    async fn recreate_database(&self, name: &str) -> Result<(), BoxError> {
        let mut state = self.record(format!("recreate_database {name}"));
        state.check(Failure::RecreateDatabase)?;
        state.recreated_databases.push(name.to_string());

        Ok(())
    }
}

#[async_trait]
impl MigrationRunner for MockHost {
    async fn sync_schema(&self) -> Result<(), BoxError> {
        let mut state = self.record("sync_schema".to_string());
        state.check(Failure::SyncSchema)?;
        state.schema_syncs += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_injected_failure_and_recovery() {
        let host = MockHost::new("/tmp/sites");
        host.fail(Failure::SyncSchema);

        assert!(host.sync_schema().await.is_err());
        assert_eq!(host.schema_syncs(), 0);

        host.recover(Failure::SyncSchema);

        assert!(host.sync_schema().await.is_ok());
        assert_eq!(host.schema_syncs(), 1);
        assert_eq!(host.events(), vec!["sync_schema", "sync_schema"]);
    }

    #[tokio::test]
    async fn test_stop_unknown_process_is_ok() {
        let host = MockHost::new("/tmp/sites");

        assert!(host.stop("placement-api").await.is_ok());
        assert!(host.running_processes().is_empty());
    }
}
