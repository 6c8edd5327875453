//! The lifecycle state machine driven by the deployment orchestrator.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::accounts::{AccountProvisioner, IdentityRegistration, RegistrationRequest};
use crate::config_writer::ConfigWriter;
use crate::database::DatabaseBootstrapper;
use crate::error::{Error, Result};
use crate::host::Collaborators;
use crate::readiness::ReadinessProbe;
use crate::state::{LifecycleState, Phase, RunningProcessHandle, StateStore};
use crate::{BackendMode, DeploymentSpec};

/// Python package providing the embedded application server.
const UWSGI_PACKAGE: &str = "uwsgi";

/// Drives one deployment through install, configure, init, start, stop and cleanup.
///
/// Each phase is a separate invocation by the orchestrator, so everything later
/// phases depend on (backend mode, running handle) is persisted through a
/// `StateStore`. Phase order is the orchestrator's responsibility.
#[derive(Clone)]
pub struct LifecycleController {
    accounts: AccountProvisioner,
    collaborators: Collaborators,
    database: DatabaseBootstrapper,
    probe: ReadinessProbe,
    spec: Arc<DeploymentSpec>,
    state: StateStore,
}

impl LifecycleController {
    /// Creates a new `LifecycleController`.
    ///
    /// # Errors
    ///
    /// Returns an error if the readiness probe's HTTP client cannot be built.
    pub fn new(spec: Arc<DeploymentSpec>, collaborators: Collaborators) -> Result<Self> {
        Ok(Self {
            accounts: AccountProvisioner::new(collaborators.identity.clone()),
            database: DatabaseBootstrapper::new(
                collaborators.database.clone(),
                collaborators.migrations.clone(),
            ),
            probe: ReadinessProbe::new(spec.poll_interval())?,
            state: StateStore::new(spec.state_dir()),
            collaborators,
            spec,
        })
    }

    /// The deployment this controller drives.
    #[must_use]
    pub fn spec(&self) -> &DeploymentSpec {
        &self.spec
    }

    /// Current persisted lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state record cannot be read.
    pub async fn state(&self) -> Result<LifecycleState> {
        self.state.load().await
    }

    /// Installs the web-server integration of the selected backend and the
    /// client plugin.
    ///
    /// The embedded server needs the web server's uWSGI proxy support and the
    /// uWSGI package itself; the proxied site needs the web server's WSGI module.
    ///
    /// # Errors
    ///
    /// Returns an error if any installation fails.
    pub async fn install(&self) -> Result<()> {
        let mode = self.spec.backend_mode();

        info!("installing {} for {}...", self.spec.service().name, mode);

        match mode {
            BackendMode::EmbeddedServer => {
                self.collaborators
                    .web_server
                    .install_uwsgi_proxy()
                    .await
                    .map_err(|e| {
                        Error::Collaborator("failed to install web server uwsgi proxy support", e)
                    })?;

                self.collaborators
                    .packages
                    .install_python_package(UWSGI_PACKAGE)
                    .await
                    .map_err(|e| Error::Collaborator("failed to install application server", e))?;
            }
            BackendMode::ProxiedSite => {
                self.collaborators
                    .web_server
                    .install_wsgi()
                    .await
                    .map_err(|e| {
                        Error::Collaborator("failed to install web server wsgi support", e)
                    })?;
            }
        }

        self.collaborators
            .packages
            .install_python_package(self.spec.client_plugin())
            .await
            .map_err(|e| Error::Collaborator("failed to install client plugin", e))?;

        self.record_phase(Phase::Installed).await
    }

    /// Removes generated site and application-server config files.
    ///
    /// Safe to run at any time, including before any other phase. A running
    /// handle survives so that a later `stop` can still tear it down.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be removed.
    pub async fn cleanup(&self) -> Result<()> {
        info!("cleaning up {}...", self.spec.service().name);

        let site_config = self
            .collaborators
            .web_server
            .site_config_path(self.spec.site_name());

        crate::fs::remove_if_exists(&site_config).await?;
        crate::fs::remove_if_exists(&self.spec.uwsgi_conf_file()).await?;

        let state = self.state.load().await?;
        match state.handle {
            Some(handle) => {
                warn!("cleanup while {:?} is still running; keeping its handle", handle);
                self.state
                    .save(&LifecycleState {
                        phase: Phase::Uninstalled,
                        backend_mode: None,
                        handle: Some(handle),
                    })
                    .await
            }
            None => self.state.clear().await,
        }
    }

    /// Writes the service config and the config of the selected backend.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be written, or if a handle of the
    /// other backend mode is still running.
    pub async fn configure(&self) -> Result<()> {
        let mode = self.spec.backend_mode();
        let mut state = self.state.load().await?;

        if let Some(handle) = &state.handle {
            if handle.mode() != mode {
                return Err(Error::BackendModeChanged {
                    configured: handle.mode(),
                    requested: mode,
                });
            }
        }

        info!("configuring {} for {}", self.spec.service().name, mode);

        let writer = ConfigWriter::new(&self.spec);
        writer.write_service_config().await?;

        let site_config = self
            .collaborators
            .web_server
            .site_config_path(self.spec.site_name());

        match mode {
            BackendMode::EmbeddedServer => {
                writer.write_app_server_config().await?;
                writer.write_proxy_site_config(&site_config).await?;
            }
            BackendMode::ProxiedSite => {
                writer.write_site_config(&site_config).await?;
            }
        }

        state.backend_mode = Some(mode);
        state.phase = Phase::Configured;
        self.state.save(&state).await
    }

    /// Prepares the database when enabled, then registers the service.
    ///
    /// A deployment that is already running stays in its running phase.
    ///
    /// # Errors
    ///
    /// Returns an error if database bootstrap or identity provisioning fails.
    /// Provisioning is not attempted after a failed bootstrap.
    pub async fn init(&self) -> Result<IdentityRegistration> {
        if let Some(settings) = self.spec.database() {
            self.database.bootstrap(settings).await?;
        } else {
            debug!("database disabled, skipping bootstrap");
        }

        let registration = self
            .accounts
            .ensure(&RegistrationRequest::from_spec(&self.spec))
            .await?;

        let mut state = self.state.load().await?;
        if state.handle.is_none() {
            state.phase = Phase::Initialized;
        } else {
            debug!("{} is running, keeping phase {:?}", self.spec.process_name(), state.phase);
        }
        self.state.save(&state).await?;

        Ok(registration)
    }

    /// Launches the service and waits until its public URL answers.
    ///
    /// If the URL never answers within the timeout, whatever was launched is
    /// torn down again and no handle is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend mode differs from the one recorded at
    /// configure time, if launching fails, or if readiness times out.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.load().await?;
        let mode = self.resolve_mode(&state)?;
        let url = self.spec.service().public_url();

        if let Some(handle) = &state.handle {
            info!("{:?} already started, checking readiness", handle);
            return self.wait_ready(&url).await;
        }

        let handle = self.launch(mode).await?;

        info!("waiting for {} to start...", self.spec.process_name());

        if let Err(e) = self.wait_ready(&url).await {
            self.rollback(&handle).await;
            return Err(e);
        }

        info!("{} is answering on {}", self.spec.process_name(), url);

        state.handle = Some(handle);
        state.phase = Phase::Running;
        self.state.save(&state).await
    }

    /// Stops whatever `start` launched. Does nothing if nothing is running.
    ///
    /// # Errors
    ///
    /// Returns an error if stopping the process or disabling the site fails.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.load().await?;

        let Some(handle) = state.handle.take() else {
            debug!("no running {} to stop", self.spec.process_name());
            return Ok(());
        };

        if handle.mode() != self.spec.backend_mode() {
            warn!(
                "{:?} was started as {}, stopping it as such despite {} now being selected",
                handle,
                handle.mode(),
                self.spec.backend_mode()
            );
        }

        info!("{} shutting down...", self.spec.process_name());

        self.teardown(&handle).await?;

        info!("{} shutdown", self.spec.process_name());

        state.phase = Phase::Stopped;
        self.state.save(&state).await
    }

    fn resolve_mode(&self, state: &LifecycleState) -> Result<BackendMode> {
        let requested = self.spec.backend_mode();

        match state.backend_mode {
            Some(configured) if configured != requested => Err(Error::BackendModeChanged {
                configured,
                requested,
            }),
            Some(_) => Ok(requested),
            None => {
                debug!("no backend mode recorded, using {}", requested);
                Ok(requested)
            }
        }
    }

    async fn launch(&self, mode: BackendMode) -> Result<RunningProcessHandle> {
        let name = self.spec.process_name();

        match mode {
            BackendMode::EmbeddedServer => {
                let command = vec![
                    self.spec.bin_dir().join("uwsgi").display().to_string(),
                    "--procname-prefix".to_string(),
                    self.spec.service().name.clone(),
                    "--ini".to_string(),
                    self.spec.uwsgi_conf_file().display().to_string(),
                ];

                self.collaborators
                    .processes
                    .run(name, &command)
                    .await
                    .map_err(|e| Error::Collaborator("failed to launch application server", e))?;

                // The site is back to disabled if exposing it failed.
                if let Err(e) = self.expose_site(self.spec.site_name()).await {
                    if let Err(undo) = self.stop_process(name).await {
                        warn!("failed to stop {} after a failed launch: {}", name, undo);
                    }
                    return Err(e);
                }

                Ok(RunningProcessHandle::Process {
                    name: name.to_string(),
                })
            }
            BackendMode::ProxiedSite => {
                let site = self.spec.site_name();

                self.expose_site(site).await?;

                let handle = RunningProcessHandle::Site {
                    name: site.to_string(),
                };

                let log = self.collaborators.web_server.site_log_path(site);
                if let Err(e) = self.collaborators.processes.tail_log(name, &log).await {
                    self.rollback(&handle).await;
                    return Err(Error::Collaborator("failed to follow site log", e));
                }

                Ok(handle)
            }
        }
    }

    // Enables `site` and restarts the web server. A failed restart disables the
    // site again so nothing is left enabled without a handle.
    async fn expose_site(&self, site: &str) -> Result<()> {
        let web_server = &self.collaborators.web_server;

        web_server
            .enable_site(site)
            .await
            .map_err(|e| Error::Collaborator("failed to enable site", e))?;

        if let Err(e) = web_server.restart().await {
            if let Err(undo) = web_server.disable_site(site).await {
                warn!("failed to disable {} after a failed restart: {}", site, undo);
            }
            return Err(Error::Collaborator("failed to restart web server", e));
        }

        Ok(())
    }

    async fn hide_site(&self, site: &str) -> Result<()> {
        let web_server = &self.collaborators.web_server;

        web_server
            .disable_site(site)
            .await
            .map_err(|e| Error::Collaborator("failed to disable site", e))?;
        web_server
            .restart()
            .await
            .map_err(|e| Error::Collaborator("failed to restart web server", e))
    }

    async fn stop_process(&self, name: &str) -> Result<()> {
        self.collaborators
            .processes
            .stop(name)
            .await
            .map_err(|e| Error::Collaborator("failed to stop supervised process", e))
    }

    async fn teardown(&self, handle: &RunningProcessHandle) -> Result<()> {
        match handle {
            RunningProcessHandle::Process { name } => {
                self.hide_site(self.spec.site_name()).await?;
                self.stop_process(name).await
            }
            RunningProcessHandle::Site { name } => {
                self.hide_site(name).await?;
                self.stop_process(self.spec.process_name()).await
            }
        }
    }

    // Best-effort teardown of a launch that did not complete.
    async fn rollback(&self, handle: &RunningProcessHandle) {
        if let Err(e) = self.teardown(handle).await {
            warn!("failed to tear down {:?}: {}", handle, e);
        }
    }

    async fn wait_ready(&self, url: &str) -> Result<()> {
        self.probe
            .wait(self.spec.process_name(), url, self.spec.service_timeout())
            .await
    }

    async fn record_phase(&self, phase: Phase) -> Result<()> {
        let mut state = self.state.load().await?;
        state.phase = phase;
        self.state.save(&state).await
    }
}
