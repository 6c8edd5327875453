//! Provisions, configures and supervises the placement API service.
//!
//! The orchestrator drives a [`LifecycleController`] one hook at a time:
//! `install`, `configure`, `init`, `start`, `stop` and `cleanup`. Each hook is
//! safe to re-run. External tools are reached through the traits in [`host`].
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod accounts;
mod backend;
mod config_writer;
mod database;
mod error;
mod fs;
pub mod host;
mod ini;
mod lifecycle;
mod readiness;
mod site_template;
mod spec;
mod state;

pub use accounts::{
    AccountProvisioner, IdentityRegistration, PUBLIC_INTERFACE, Provisioned, RegistrationRequest,
};
pub use backend::{BackendMode, EMBEDDED_SERVER_SENTINEL};
pub use config_writer::{ConfigEntry, ConfigWriter};
pub use database::DatabaseBootstrapper;
pub use error::{BoxError, Error, Result};
pub use host::Collaborators;
pub use ini::IniFile;
pub use lifecycle::LifecycleController;
pub use readiness::ReadinessProbe;
pub use site_template::{DEFAULT_SITE_TEMPLATE, SiteValues};
pub use spec::{
    DatabaseBackend, DatabaseSettings, DeploymentOptions, DeploymentSpec, PROCESS_NAME, Protocol,
    SERVICE_NAME, ServiceCredentials, ServiceDescriptor, TlsSettings, VirtualEnv,
};
pub use state::{LifecycleState, Phase, RunningProcessHandle, STATE_FILENAME, StateStore};
