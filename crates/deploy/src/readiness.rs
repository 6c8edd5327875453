//! Polls the public URL until the service answers.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, trace};

use crate::error::{Error, Result};

// Bound on a single probe so a hung connection cannot eat the whole timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Readiness probe for a freshly started service.
#[derive(Clone, Debug)]
pub struct ReadinessProbe {
    client: Client,
    interval: Duration,
}

impl ReadinessProbe {
    /// Creates a probe that retries every `interval`.
    ///
    /// Certificates are not verified and proxies are bypassed, since the probe
    /// only asks whether something is answering on the URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(interval: Duration) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .no_proxy()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { client, interval })
    }

    /// Whether anything answers on `url` right now. Any HTTP status counts.
    pub async fn is_ready(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => {
                debug!("{} answered with {}", url, response.status());
                true
            }
            Err(e) => {
                trace!("{} not answering yet: {}", url, e);
                false
            }
        }
    }

    /// Blocks until `url` answers or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns `Error::ReadinessTimeout` naming `name` if the URL never answers.
    pub async fn wait(&self, name: &str, url: &str, timeout: Duration) -> Result<()> {
        let poll = async {
            while !self.is_ready(url).await {
                tokio::time::sleep(self.interval).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| Error::ReadinessTimeout {
                name: name.to_string(),
                url: url.to_string(),
                timeout,
            })
    }
}
