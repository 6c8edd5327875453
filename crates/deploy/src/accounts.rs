//! Get-or-create registration of the service account, catalog entry and endpoint.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::DeploymentSpec;
use crate::error::{Error, Result};
use crate::host::IdentityClient;

/// Interface the endpoint is registered under.
pub const PUBLIC_INTERFACE: &str = "public";

/// Whether a record was created by this run or already present.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Provisioned {
    /// Created by this run.
    Created,

    /// Already present and left untouched.
    Existing,
}

/// Desired identity state for one service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegistrationRequest {
    /// Account, catalog service and endpoint name.
    pub name: String,

    /// Password of the service account.
    pub password: String,

    /// Domain of the account and project.
    pub domain: String,

    /// Project the role is granted on.
    pub project: String,

    /// Role granted to the account.
    pub role: String,

    /// Catalog service type.
    pub service_type: String,

    /// Catalog service description.
    pub description: String,

    /// Region of the endpoint.
    pub region: String,

    /// Public endpoint URL.
    pub url: String,
}

impl RegistrationRequest {
    /// Builds the request for a deployment.
    #[must_use]
    pub fn from_spec(spec: &DeploymentSpec) -> Self {
        let service = spec.service();
        let credentials = spec.credentials();

        Self {
            name: service.name.clone(),
            password: credentials.password.clone(),
            domain: credentials.user_domain_name.clone(),
            project: credentials.project_name.clone(),
            role: spec.service_role().to_string(),
            service_type: service.name.clone(),
            description: "Placement Service".to_string(),
            region: spec.region().to_string(),
            url: service.public_url(),
        }
    }
}

/// Identity records after provisioning. Nothing here is persisted locally.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IdentityRegistration {
    /// Service account id.
    pub user_id: String,

    /// Whether the account was created.
    pub user: Provisioned,

    /// Whether the role assignment was created.
    pub role: Provisioned,

    /// Catalog service id.
    pub service_id: String,

    /// Whether the catalog service was created.
    pub service: Provisioned,

    /// Endpoint id.
    pub endpoint_id: String,

    /// Whether the endpoint was created.
    pub endpoint: Provisioned,
}

/// Ensures identity state matches a `RegistrationRequest`.
#[derive(Clone)]
pub struct AccountProvisioner {
    identity: Arc<dyn IdentityClient>,
}

impl AccountProvisioner {
    /// Creates a new `AccountProvisioner`.
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityClient>) -> Self {
        Self { identity }
    }

    /// Creates whatever part of the registration is missing.
    ///
    /// Each record is looked up first and only created when absent, so partial
    /// earlier state converges and repeated runs change nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity service cannot be queried or written.
    pub async fn ensure(&self, request: &RegistrationRequest) -> Result<IdentityRegistration> {
        let (user_id, user) = self.ensure_user(request).await?;
        let role = self.ensure_role(request, &user_id).await?;
        let (service_id, service) = self.ensure_service(request).await?;
        let (endpoint_id, endpoint) = self.ensure_endpoint(request, &service_id).await?;

        Ok(IdentityRegistration {
            user_id,
            user,
            role,
            service_id,
            service,
            endpoint_id,
            endpoint,
        })
    }

    async fn ensure_user(&self, request: &RegistrationRequest) -> Result<(String, Provisioned)> {
        if let Some(id) = self
            .identity
            .find_user(&request.name, &request.domain)
            .await
            .map_err(|e| Error::Collaborator("failed to look up service user", e))?
        {
            debug!("service user {} already exists", request.name);
            return Ok((id, Provisioned::Existing));
        }

        let id = self
            .identity
            .create_user(&request.name, &request.password, &request.domain)
            .await
            .map_err(|e| Error::Collaborator("failed to create service user", e))?;

        info!("created service user {} ({})", request.name, id);

        Ok((id, Provisioned::Created))
    }

    async fn ensure_role(
        &self,
        request: &RegistrationRequest,
        user_id: &str,
    ) -> Result<Provisioned> {
        let has_role = self
            .identity
            .has_role(user_id, &request.project, &request.domain, &request.role)
            .await
            .map_err(|e| Error::Collaborator("failed to look up role assignment", e))?;

        if has_role {
            debug!(
                "{} already holds role {} on {}",
                request.name, request.role, request.project
            );
            return Ok(Provisioned::Existing);
        }

        self.identity
            .add_role(user_id, &request.project, &request.domain, &request.role)
            .await
            .map_err(|e| Error::Collaborator("failed to assign role", e))?;

        info!(
            "granted role {} on {} to {}",
            request.role, request.project, request.name
        );

        Ok(Provisioned::Created)
    }

    async fn ensure_service(&self, request: &RegistrationRequest) -> Result<(String, Provisioned)> {
        if let Some(id) = self
            .identity
            .find_service(&request.name, &request.service_type)
            .await
            .map_err(|e| Error::Collaborator("failed to look up catalog service", e))?
        {
            debug!("catalog service {} already exists", request.name);
            return Ok((id, Provisioned::Existing));
        }

        let id = self
            .identity
            .create_service(&request.name, &request.service_type, &request.description)
            .await
            .map_err(|e| Error::Collaborator("failed to create catalog service", e))?;

        info!("created catalog service {} ({})", request.name, id);

        Ok((id, Provisioned::Created))
    }

    async fn ensure_endpoint(
        &self,
        request: &RegistrationRequest,
        service_id: &str,
    ) -> Result<(String, Provisioned)> {
        if let Some(endpoint) = self
            .identity
            .find_endpoint(service_id, PUBLIC_INTERFACE, &request.region)
            .await
            .map_err(|e| Error::Collaborator("failed to look up endpoint", e))?
        {
            if endpoint.url == request.url {
                debug!("endpoint {} already registered", endpoint.url);
            } else {
                warn!(
                    "endpoint {} is registered as {}, expected {}; leaving it unchanged",
                    endpoint.id, endpoint.url, request.url
                );
            }
            return Ok((endpoint.id, Provisioned::Existing));
        }

        let id = self
            .identity
            .create_endpoint(service_id, PUBLIC_INTERFACE, &request.region, &request.url)
            .await
            .map_err(|e| Error::Collaborator("failed to create endpoint", e))?;

        info!("registered endpoint {} ({})", request.url, id);

        Ok((id, Provisioned::Created))
    }
}
