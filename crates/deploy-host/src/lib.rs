//! Host implementations of the placement deployment collaborators.
//!
//! Each collaborator shells out to the tool a Debian-style host already has:
//! `apt-get` and the `a2*` helpers for Apache, `systemctl` for supervision,
//! `pip` for packages, the `openstack` client for identity records, and the
//! database command line clients for resets.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod apache;
mod command;
mod database;
mod error;
mod openstack;
mod pip;
mod systemd;

pub use apache::{Apache, ApacheOptions};
pub use command::CommandRunner;
pub use database::{PlacementManage, SqlDatabaseAdmin};
pub use error::{Error, Result};
pub use openstack::OpenStackCli;
pub use pip::Pip;
pub use systemd::{Systemd, SystemdOptions};
