//! Typed rendering of the web-server site config.

use std::sync::LazyLock;

use regex::Regex;

use crate::DeploymentSpec;
use crate::error::{Error, Result};

/// Site template shipped with the crate.
pub static DEFAULT_SITE_TEMPLATE: &str = include_str!("../templates/placement-api.conf.template");

/// Any token shaped like a placeholder.
static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%[A-Z][A-Z0-9_]*%").expect("Invalid regex pattern"));

/// Values substituted into the site template, one field per placeholder.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SiteValues {
    /// `%APACHE_NAME%`
    pub apache_name: String,

    /// `%PUBLICWSGI%`
    pub public_wsgi: String,

    /// `%SSLENGINE%`
    pub ssl_engine: String,

    /// `%SSLCERTFILE%`
    pub ssl_cert_file: String,

    /// `%SSLKEYFILE%`
    pub ssl_key_file: String,

    /// `%USER%`
    pub user: String,

    /// `%VIRTUALENV%`
    pub virtualenv: String,

    /// `%APIWORKERS%`
    pub api_workers: String,
}

impl SiteValues {
    /// Derives the values from a deployment. Settings that do not apply render empty.
    #[must_use]
    pub fn from_spec(spec: &DeploymentSpec) -> Self {
        let (ssl_engine, ssl_cert_file, ssl_key_file) =
            spec.tls().map_or_else(Default::default, |tls| {
                (
                    "SSLEngine On".to_string(),
                    format!("SSLCertificateFile {}", tls.cert_file.display()),
                    format!("SSLCertificateKeyFile {}", tls.key_file.display()),
                )
            });

        let virtualenv = spec.venv().map_or_else(String::new, |venv| {
            format!("python-path={}", venv.site_packages().display())
        });

        Self {
            apache_name: spec.web_server_name().to_string(),
            public_wsgi: spec.public_wsgi().display().to_string(),
            ssl_engine,
            ssl_cert_file,
            ssl_key_file,
            user: spec.stack_user().to_string(),
            virtualenv,
            api_workers: spec.api_workers().to_string(),
        }
    }

    fn substitutions(&self) -> [(&'static str, &str); 8] {
        // Destructured so that a new field cannot be added without a placeholder.
        let Self {
            apache_name,
            public_wsgi,
            ssl_engine,
            ssl_cert_file,
            ssl_key_file,
            user,
            virtualenv,
            api_workers,
        } = self;

        [
            ("%APACHE_NAME%", apache_name.as_str()),
            ("%PUBLICWSGI%", public_wsgi.as_str()),
            ("%SSLENGINE%", ssl_engine.as_str()),
            ("%SSLCERTFILE%", ssl_cert_file.as_str()),
            ("%SSLKEYFILE%", ssl_key_file.as_str()),
            ("%USER%", user.as_str()),
            ("%VIRTUALENV%", virtualenv.as_str()),
            ("%APIWORKERS%", api_workers.as_str()),
        ]
    }

    /// Renders `template`, replacing every occurrence of every placeholder.
    ///
    /// # Errors
    ///
    /// Returns an error if the output still contains a placeholder-shaped token.
    pub fn render(&self, template: &str) -> Result<String> {
        let rendered = self
            .substitutions()
            .into_iter()
            .fold(template.to_string(), |acc, (placeholder, value)| {
                acc.replace(placeholder, value)
            });

        if let Some(token) = PLACEHOLDER_REGEX.find(&rendered) {
            return Err(Error::UnresolvedPlaceholder(token.as_str().to_string()));
        }

        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::spec::tests::options;
    use crate::{DeploymentOptions, TlsSettings, VirtualEnv};

    #[test]
    fn test_default_template_fully_resolved() {
        let spec = DeploymentSpec::new(options()).unwrap();

        let rendered = SiteValues::from_spec(&spec)
            .render(DEFAULT_SITE_TEMPLATE)
            .unwrap();

        assert!(!PLACEHOLDER_REGEX.is_match(&rendered));
        assert!(rendered.starts_with("Listen 8780\n\n<VirtualHost *:8780>\n"));
        assert!(rendered.contains("processes=2 threads=1 user=stack"));
        assert!(rendered.contains("WSGIScriptAlias / /usr/local/bin/placement-api"));
        assert!(rendered.contains("ErrorLog /var/log/apache2/placement-api.log"));
        // Web-server directives that merely look similar are left alone.
        assert!(rendered.contains("%{GLOBAL}"));
        assert!(!rendered.contains("SSLEngine"));
    }

    #[test]
    fn test_tls_and_venv_rendered() {
        let spec = DeploymentSpec::new(DeploymentOptions {
            tls: Some(TlsSettings {
                cert_file: PathBuf::from("/etc/ssl/placement.crt"),
                key_file: PathBuf::from("/etc/ssl/placement.key"),
            }),
            venv: Some(VirtualEnv {
                root: PathBuf::from("/opt/venv"),
                python_version: "python3.12".to_string(),
            }),
            ..options()
        })
        .unwrap();

        let rendered = SiteValues::from_spec(&spec)
            .render(DEFAULT_SITE_TEMPLATE)
            .unwrap();

        assert!(rendered.contains("SSLEngine On"));
        assert!(rendered.contains("SSLCertificateFile /etc/ssl/placement.crt"));
        assert!(rendered.contains("SSLCertificateKeyFile /etc/ssl/placement.key"));
        assert!(rendered.contains("python-path=/opt/venv/lib/python3.12/site-packages"));
        assert!(rendered.contains("Alias /placement /opt/venv/bin/placement-api"));
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let spec = DeploymentSpec::new(options()).unwrap();

        let result = SiteValues::from_spec(&spec).render("Listen %PUBLICPORT%\n%USER%\n");

        assert!(matches!(
            result,
            Err(Error::UnresolvedPlaceholder(token)) if token == "%PUBLICPORT%"
        ));
    }

    #[test]
    fn test_placeholders_replaced_globally() {
        let spec = DeploymentSpec::new(options()).unwrap();

        let rendered = SiteValues::from_spec(&spec)
            .render("%USER% %USER% %APIWORKERS%")
            .unwrap();

        assert_eq!(rendered, "stack stack 2");
    }
}
