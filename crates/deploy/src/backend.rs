//! Selection between the two application-server backends.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Value of the WSGI mode setting that selects the embedded server.
pub const EMBEDDED_SERVER_SENTINEL: &str = "uwsgi";

/// Which application-server strategy serves the API.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendMode {
    /// The service runs its own application-server process.
    EmbeddedServer,

    /// The service runs as a named site behind the shared web server.
    ProxiedSite,
}

impl BackendMode {
    /// Selects the backend from the WSGI execution-mode setting.
    #[must_use]
    pub fn select(wsgi_mode: &str) -> Self {
        if wsgi_mode == EMBEDDED_SERVER_SENTINEL {
            Self::EmbeddedServer
        } else {
            Self::ProxiedSite
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmbeddedServer => write!(f, "embedded-server"),
            Self::ProxiedSite => write!(f, "proxied-site"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_selects_embedded_server() {
        assert_eq!(BackendMode::select("uwsgi"), BackendMode::EmbeddedServer);
    }

    #[test]
    fn test_anything_else_selects_proxied_site() {
        assert_eq!(BackendMode::select("mod_wsgi"), BackendMode::ProxiedSite);
        assert_eq!(BackendMode::select(""), BackendMode::ProxiedSite);
        // Exact match only.
        assert_eq!(BackendMode::select("UWSGI"), BackendMode::ProxiedSite);
    }
}
