//! Identity and catalog records through the `openstack` command line client.

use async_trait::async_trait;
use placement_deploy::BoxError;
use placement_deploy::host::{Endpoint, IdentityClient};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::command::CommandRunner;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct NamedRecord {
    #[serde(rename = "ID")]
    id: String,

    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ServiceRecord {
    #[serde(rename = "ID")]
    id: String,

    #[serde(rename = "Name")]
    name: String,

    #[serde(rename = "Type")]
    service_type: String,
}

#[derive(Debug, Deserialize)]
struct EndpointRecord {
    #[serde(rename = "ID")]
    id: String,

    #[serde(rename = "URL")]
    url: String,
}

/// Talks to the identity service by running `openstack`.
///
/// Credentials come from the named cloud in `clouds.yaml`, or from the
/// `OS_*` environment when no cloud is given.
#[derive(Clone, Debug)]
pub struct OpenStackCli {
    cloud: Option<String>,
    runner: CommandRunner,
}

impl OpenStackCli {
    /// Creates a client for `cloud`.
    #[must_use]
    pub const fn new(cloud: Option<String>) -> Self {
        Self {
            cloud,
            runner: CommandRunner::new(false),
        }
    }

    async fn openstack(&self, args: &[&str]) -> Result<String> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(cloud) = &self.cloud {
            full.push("--os-cloud");
            full.push(cloud.as_str());
        }
        full.extend_from_slice(args);

        self.runner.run("openstack", &full).await
    }

    async fn list<T: DeserializeOwned>(&self, args: &[&str]) -> Result<Vec<T>> {
        let mut full = args.to_vec();
        full.extend_from_slice(&["-f", "json"]);

        let stdout = self.openstack(&full).await?;

        parse_list(&stdout)
    }

    async fn create(&self, args: &[&str]) -> Result<String> {
        let mut full = args.to_vec();
        full.extend_from_slice(&["-f", "value", "-c", "id"]);

        let stdout = self.openstack(&full).await?;
        let id = stdout.trim();

        if id.is_empty() {
            return Err(Error::MissingId(args.join(" ")));
        }

        Ok(id.to_string())
    }
}

fn parse_list<T: DeserializeOwned>(stdout: &str) -> Result<Vec<T>> {
    // Empty listings print nothing rather than `[]` on some client versions.
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(stdout).map_err(|e| Error::Json("unexpected openstack output", e))
}

#[async_trait]
impl IdentityClient for OpenStackCli {
    async fn find_user(&self, name: &str, domain: &str) -> std::result::Result<Option<String>, BoxError> {
        let users: Vec<NamedRecord> = self.list(&["user", "list", "--domain", domain]).await?;

        Ok(users.into_iter().find(|u| u.name == name).map(|u| u.id))
    }

    async fn create_user(
        &self,
        name: &str,
        password: &str,
        domain: &str,
    ) -> std::result::Result<String, BoxError> {
        let id = self
            .create(&["user", "create", "--domain", domain, "--password", password, name])
            .await?;

        Ok(id)
    }

    async fn has_role(
        &self,
        user_id: &str,
        project: &str,
        domain: &str,
        role: &str,
    ) -> std::result::Result<bool, BoxError> {
        let assignments: Vec<serde_json::Value> = self
            .list(&[
                "role",
                "assignment",
                "list",
                "--user",
                user_id,
                "--project",
                project,
                "--project-domain",
                domain,
                "--role",
                role,
            ])
            .await?;

        debug!("{} assignments of {} to {}", assignments.len(), role, user_id);

        Ok(!assignments.is_empty())
    }

    async fn add_role(
        &self,
        user_id: &str,
        project: &str,
        domain: &str,
        role: &str,
    ) -> std::result::Result<(), BoxError> {
        self.openstack(&[
            "role",
            "add",
            "--user",
            user_id,
            "--project",
            project,
            "--project-domain",
            domain,
            role,
        ])
        .await?;

        Ok(())
    }

    async fn find_service(
        &self,
        name: &str,
        service_type: &str,
    ) -> std::result::Result<Option<String>, BoxError> {
        let services: Vec<ServiceRecord> = self.list(&["service", "list"]).await?;

        Ok(services
            .into_iter()
            .find(|s| s.name == name && s.service_type == service_type)
            .map(|s| s.id))
    }

    async fn create_service(
        &self,
        name: &str,
        service_type: &str,
        description: &str,
    ) -> std::result::Result<String, BoxError> {
        let id = self
            .create(&[
                "service",
                "create",
                "--name",
                name,
                "--description",
                description,
                service_type,
            ])
            .await?;

        Ok(id)
    }

    async fn find_endpoint(
        &self,
        service_id: &str,
        interface: &str,
        region: &str,
    ) -> std::result::Result<Option<Endpoint>, BoxError> {
        let endpoints: Vec<EndpointRecord> = self
            .list(&[
                "endpoint",
                "list",
                "--service",
                service_id,
                "--interface",
                interface,
                "--region",
                region,
            ])
            .await?;

        Ok(endpoints.into_iter().next().map(|e| Endpoint {
            id: e.id,
            url: e.url,
        }))
    }

    async fn create_endpoint(
        &self,
        service_id: &str,
        interface: &str,
        region: &str,
        url: &str,
    ) -> std::result::Result<String, BoxError> {
        let id = self
            .create(&[
                "endpoint", "create", "--region", region, service_id, interface, url,
            ])
            .await?;

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_list() {
        let stdout = r#"[
            {"ID": "a1", "Name": "keystone", "Type": "identity"},
            {"ID": "b2", "Name": "placement", "Type": "placement"}
        ]"#;

        let services: Vec<ServiceRecord> = parse_list(stdout).unwrap();

        assert_eq!(services.len(), 2);
        assert_eq!(services[1].id, "b2");
        assert_eq!(services[1].service_type, "placement");
    }

    #[test]
    fn test_parse_endpoint_list_ignores_extra_fields() {
        let stdout = r#"[{"ID": "e1", "Region": "RegionOne", "Service Name": "placement",
            "Service Type": "placement", "Enabled": true, "Interface": "public",
            "URL": "http://10.0.0.5/placement"}]"#;

        let endpoints: Vec<EndpointRecord> = parse_list(stdout).unwrap();

        assert_eq!(endpoints[0].url, "http://10.0.0.5/placement");
    }

    #[test]
    fn test_empty_output_is_empty_list() {
        let users: Vec<NamedRecord> = parse_list("\n").unwrap();

        assert!(users.is_empty());
    }

    #[test]
    fn test_malformed_output_is_an_error() {
        let result: Result<Vec<NamedRecord>> = parse_list("Missing value auth-url");

        assert!(matches!(result, Err(Error::Json(..))));
    }
}
