//! Shared helpers for the PostgreSQL integration tests
//!
//! Each test gets its own throwaway PostgreSQL container with the products
//! table migrated in. Docker must be available.

#![allow(dead_code)]

use anyhow::Result;
use prodsync_ingest::config::DatabaseConfig;
use prodsync_ingest::PgRecordStore;
use std::path::{Path, PathBuf};
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,prodsync_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Running PostgreSQL container with a migrated record store
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    config: DatabaseConfig,
    store: PgRecordStore,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        let container = Postgres::default().with_tag("16-alpine").start().await?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(5432).await?;

        let config = DatabaseConfig {
            host: host.to_string(),
            port,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            max_connections: 2,
            connect_timeout_secs: 10,
        };

        let store = PgRecordStore::connect(&config).await?;
        store.migrate().await?;

        info!(host = %host, port, "Test PostgreSQL ready");

        Ok(Self {
            _container: container,
            config,
            store,
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn store(&self) -> &PgRecordStore {
        &self.store
    }

    /// Write an INI file pointing at this container
    pub fn write_ini(&self, dir: &Path, section: &str, extra: &str) -> Result<PathBuf> {
        let path = dir.join("database.ini");
        let contents = format!(
            "[{section}]\nhost = {}\nport = {}\ndbname = {}\nuser = {}\npassword = {}\n\n{extra}",
            self.config.host,
            self.config.port,
            self.config.database,
            self.config.user,
            self.config.password,
        );
        std::fs::write(&path, contents)?;
        Ok(path)
    }
}
