use std::time::Duration;

use thiserror::Error;

use crate::BackendMode;

/// Boxed error returned by external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend mode requested now differs from the one recorded earlier.
    #[error("backend mode changed from {configured} to {requested}; run stop and configure again")]
    BackendModeChanged {
        /// Mode recorded by an earlier phase.
        configured: BackendMode,

        /// Mode derived from the current deployment spec.
        requested: BackendMode,
    },

    /// An external collaborator failed.
    #[error("{0}: {1}")]
    Collaborator(&'static str, #[source] BoxError),

    /// The HTTP client used for readiness polling could not be built.
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// A deployment option was invalid.
    #[error("invalid option {0}: {1}")]
    InvalidOption(&'static str, String),

    /// The service never answered on its public URL.
    #[error("{name} did not start: no response from {url} within {timeout:?}")]
    ReadinessTimeout {
        /// Supervised process name.
        name: String,

        /// Polled URL.
        url: String,

        /// Configured timeout.
        timeout: Duration,
    },

    /// The lifecycle state file could not be encoded or decoded.
    #[error("{0}: {1}")]
    State(&'static str, #[source] serde_json::Error),

    /// A rendered template still contains a placeholder token.
    #[error("unresolved placeholder {0} in rendered site config")]
    UnresolvedPlaceholder(String),
}
