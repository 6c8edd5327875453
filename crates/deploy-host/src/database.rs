//! Database server administration and schema migration.

use std::path::PathBuf;

use async_trait::async_trait;
use placement_deploy::host::{DatabaseAdmin, MigrationRunner};
use placement_deploy::{BoxError, DatabaseBackend, DatabaseSettings};
use tracing::info;

use crate::command::CommandRunner;
use crate::error::Error;

/// Recreates databases with the `mysql` or `dropdb`/`createdb` clients.
#[derive(Clone, Debug)]
pub struct SqlDatabaseAdmin {
    backend: DatabaseBackend,
    host: String,
    password: String,
    runner: CommandRunner,
    user: String,
}

impl SqlDatabaseAdmin {
    /// Creates an admin connecting with the given settings.
    #[must_use]
    pub fn new(settings: &DatabaseSettings) -> Self {
        Self {
            backend: settings.backend,
            host: settings.host.clone(),
            password: settings.password.clone(),
            runner: CommandRunner::new(false),
            user: settings.user.clone(),
        }
    }

    async fn recreate_mysql(&self, name: &str) -> Result<(), BoxError> {
        let sql = format!(
            "DROP DATABASE IF EXISTS {name}; CREATE DATABASE {name} CHARACTER SET utf8;"
        );

        self.runner
            .run_with_env(
                "mysql",
                &["-u", self.user.as_str(), "-h", self.host.as_str(), "-e", sql.as_str()],
                &[("MYSQL_PWD", self.password.as_str())],
            )
            .await?;

        Ok(())
    }

    async fn recreate_postgresql(&self, name: &str) -> Result<(), BoxError> {
        let env = [("PGPASSWORD", self.password.as_str())];
        let connection = ["-h", self.host.as_str(), "-U", self.user.as_str()];

        let mut dropdb = connection.to_vec();
        dropdb.extend_from_slice(&["--if-exists", name]);
        self.runner.run_with_env("dropdb", &dropdb, &env).await?;

        let mut createdb = connection.to_vec();
        createdb.extend_from_slice(&["-E", "UTF8", name]);
        self.runner.run_with_env("createdb", &createdb, &env).await?;

        Ok(())
    }
}

#[async_trait]
impl DatabaseAdmin for SqlDatabaseAdmin {
    async fn recreate_database(&self, name: &str) -> Result<(), BoxError> {
        // The name is interpolated into SQL.
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::InvalidDatabaseName(name.to_string()).into());
        }

        match self.backend {
            DatabaseBackend::Mysql => self.recreate_mysql(name).await?,
            DatabaseBackend::Postgresql => self.recreate_postgresql(name).await?,
        }

        info!("database {} recreated on {}", name, self.host);

        Ok(())
    }
}

/// Runs `placement-manage db sync`.
#[derive(Clone, Debug)]
pub struct PlacementManage {
    conf_file: PathBuf,
    program: PathBuf,
    runner: CommandRunner,
}

impl PlacementManage {
    /// Creates a runner for the `placement-manage` in `bin_dir`, reading `conf_file`.
    #[must_use]
    pub fn new(bin_dir: &std::path::Path, conf_file: PathBuf) -> Self {
        Self {
            conf_file,
            program: bin_dir.join("placement-manage"),
            runner: CommandRunner::new(false),
        }
    }
}

#[async_trait]
impl MigrationRunner for PlacementManage {
    async fn sync_schema(&self) -> Result<(), BoxError> {
        let program = self.program.display().to_string();
        let conf_file = self.conf_file.display().to_string();

        self.runner
            .run(&program, &["--config-file", conf_file.as_str(), "db", "sync"])
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> DatabaseSettings {
        DatabaseSettings {
            backend: DatabaseBackend::Mysql,
            host: "127.0.0.1".to_string(),
            user: "root".to_string(),
            password: "secret".to_string(),
            name: "placement".to_string(),
            reset_on_init: true,
        }
    }

    #[tokio::test]
    async fn test_rejects_names_that_are_not_identifiers() {
        let admin = SqlDatabaseAdmin::new(&settings());

        let err = admin
            .recreate_database("placement; DROP DATABASE nova")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("invalid database name"));
    }

    #[test]
    fn test_manage_path() {
        let manage = PlacementManage::new(
            std::path::Path::new("/opt/stack/data/venv/bin"),
            PathBuf::from("/etc/placement/placement.conf"),
        );

        assert_eq!(
            manage.program,
            PathBuf::from("/opt/stack/data/venv/bin/placement-manage")
        );
    }
}
