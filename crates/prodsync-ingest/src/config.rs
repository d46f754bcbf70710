//! Configuration loading
//!
//! Settings come from an INI file (by default `database.ini`), layered with
//! `PRODSYNC__<SECTION>__<KEY>` environment variables. A `.env` file in the
//! working directory is loaded first.
//!
//! ```ini
//! [postgresql]
//! host = localhost
//! port = 5432
//! database = catalog
//! user = ingest
//! password = secret
//!
//! [api]
//! endpoint = https://api.tiki.vn/product-detail/api/v1/products/{id}
//! timeout_secs = 15
//!
//! [ingest]
//! failure_log = failures.jsonl
//! max_attempts = 1
//! ```
//!
//! Only the database section is required; `[api]` and `[ingest]` fall back to
//! the defaults below.

use crate::error::{IngestError, Result};
use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "database.ini";

/// Default INI section holding the database settings
pub const DEFAULT_DB_SECTION: &str = "postgresql";

/// Prefix for environment overrides (`PRODSYNC__POSTGRESQL__HOST`)
pub const ENV_PREFIX: &str = "PRODSYNC";

/// Default product endpoint; `{id}` is replaced by the product id
pub const DEFAULT_ENDPOINT: &str = "https://api.tiki.vn/product-detail/api/v1/products/{id}";

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Default TCP connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default `User-Agent` header; the product API rejects requests without one
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; prodsync)";

/// Default failure log location
pub const DEFAULT_FAILURE_LOG: &str = "failures.jsonl";

/// Default number of fetch attempts per id (1 = rely on reruns for retries)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;

/// Default backoff unit between attempts, multiplied by the attempt number
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 2000;

/// Default pool size; the pipeline uses one connection at a time
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 1;

/// Default database connect/acquire timeout in seconds
pub const DEFAULT_DB_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Database connection settings
#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    #[serde(alias = "dbname")]
    pub database: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Connection options for sqlx
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Product API settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// URL template containing `{id}` (or `{}`)
    pub endpoint: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    /// Normalise `name` and `description` before storing
    pub clean_text: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            clean_text: false,
        }
    }
}

/// Ingestion loop settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub failure_log: PathBuf,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            failure_log: PathBuf::from(DEFAULT_FAILURE_LOG),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub ingest: IngestConfig,
}

impl AppConfig {
    /// Load configuration from `path`, reading database settings from `db_section`
    pub fn load(path: impl AsRef<Path>, db_section: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = path.as_ref();
        if !path.is_file() {
            return Err(IngestError::config(format!(
                "configuration file '{}' not found",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::new(&path.to_string_lossy(), config::FileFormat::Ini))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(|e| {
                IngestError::config(format!("failed to read '{}': {}", path.display(), e))
            })?;

        let section = db_section.to_lowercase();
        let database: DatabaseConfig = settings.get(&section).map_err(|e| match e {
            config::ConfigError::NotFound(_) => IngestError::config(format!(
                "section [{}] not found in '{}'",
                db_section,
                path.display()
            )),
            other => IngestError::config(format!("invalid [{}] section: {}", db_section, other)),
        })?;

        let config = Self {
            database,
            api: optional_section(&settings, "api")?,
            ingest: optional_section(&settings, "ingest")?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("host", &self.database.host),
            ("database", &self.database.database),
            ("user", &self.database.user),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(IngestError::config(format!("database key '{}' is empty", key)));
            }
        }

        if self.database.port == 0 {
            return Err(IngestError::config("database port must be greater than 0"));
        }

        if self.database.max_connections == 0 {
            return Err(IngestError::config("database max_connections must be greater than 0"));
        }

        if !self.api.endpoint.contains("{id}") && !self.api.endpoint.contains("{}") {
            return Err(IngestError::config(format!(
                "api endpoint '{}' has no {{id}} placeholder",
                self.api.endpoint
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(IngestError::config("api timeout_secs must be greater than 0"));
        }

        if self.ingest.max_attempts == 0 {
            return Err(IngestError::config("ingest max_attempts must be at least 1"));
        }

        Ok(())
    }
}

fn optional_section<T>(settings: &config::Config, key: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match settings.get::<T>(key) {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => Ok(T::default()),
        Err(e) => Err(IngestError::config(format!("invalid [{}] section: {}", key, e))),
    }
}

fn default_db_max_connections() -> u32 {
    DEFAULT_DB_MAX_CONNECTIONS
}

fn default_db_connect_timeout_secs() -> u64 {
    DEFAULT_DB_CONNECT_TIMEOUT_SECS
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_ini(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const DB_SECTION: &str = "[postgresql]\n\
                              host = db.internal\n\
                              port = 6543\n\
                              database = catalog\n\
                              user = ingest\n\
                              password = s3cret\n";

    #[test]
    fn test_load_database_section_with_defaults() {
        let file = write_ini(DB_SECTION);

        let config = AppConfig::load(file.path(), "postgresql").unwrap();
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.database.database, "catalog");
        assert_eq!(config.database.max_connections, DEFAULT_DB_MAX_CONNECTIONS);
        assert_eq!(config.api.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.ingest.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.ingest.failure_log, PathBuf::from(DEFAULT_FAILURE_LOG));
    }

    #[test]
    fn test_dbname_alias() {
        let file = write_ini(
            "[postgresql_shop]\n\
             host = localhost\n\
             port = 5432\n\
             dbname = shop\n\
             user = u\n\
             password = p\n",
        );

        let config = AppConfig::load(file.path(), "postgresql_shop").unwrap();
        assert_eq!(config.database.database, "shop");
    }

    #[test]
    fn test_api_and_ingest_sections() {
        let file = write_ini(&format!(
            "{DB_SECTION}\n\
             [api]\n\
             endpoint = http://localhost:9000/p/{{id}}\n\
             timeout_secs = 3\n\
             clean_text = true\n\
             \n\
             [ingest]\n\
             failure_log = /tmp/f.jsonl\n\
             max_attempts = 5\n"
        ));

        let config = AppConfig::load(file.path(), "postgresql").unwrap();
        assert_eq!(config.api.endpoint, "http://localhost:9000/p/{id}");
        assert_eq!(config.api.timeout_secs, 3);
        assert!(config.api.clean_text);
        assert_eq!(config.api.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.ingest.max_attempts, 5);
        assert_eq!(config.ingest.failure_log, PathBuf::from("/tmp/f.jsonl"));
    }

    #[test]
    fn test_missing_required_key() {
        let file =
            write_ini("[postgresql]\nhost = localhost\nport = 5432\nuser = u\npassword = p\n");

        let err = AppConfig::load(file.path(), "postgresql").unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
        assert!(err.to_string().contains("database"));
    }

    #[test]
    fn test_missing_section() {
        let file = write_ini(DB_SECTION);

        let err = AppConfig::load(file.path(), "mysql").unwrap_err();
        assert!(matches!(err, IngestError::Config(ref msg) if msg.contains("[mysql]")));
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load("/nonexistent/database.ini", "postgresql").unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_endpoint_without_placeholder_is_rejected() {
        let file =
            write_ini(&format!("{DB_SECTION}\n[api]\nendpoint = http://localhost/products\n"));

        let err = AppConfig::load(file.path(), "postgresql").unwrap_err();
        assert!(err.to_string().contains("placeholder"));
    }

    #[test]
    fn test_zero_max_attempts_is_rejected() {
        let file = write_ini(&format!("{DB_SECTION}\n[ingest]\nmax_attempts = 0\n"));

        assert!(AppConfig::load(file.path(), "postgresql").is_err());
    }

    #[test]
    fn test_environment_override() {
        let file = write_ini(
            "[envcheck]\nhost = localhost\nport = 5432\ndatabase = d\nuser = u\npassword = p\n",
        );
        std::env::set_var("PRODSYNC__ENVCHECK__HOST", "override.internal");

        let config = AppConfig::load(file.path(), "envcheck").unwrap();
        assert_eq!(config.database.host, "override.internal");

        std::env::remove_var("PRODSYNC__ENVCHECK__HOST");
    }

    #[test]
    fn test_debug_redacts_password() {
        let file = write_ini(DB_SECTION);
        let config = AppConfig::load(file.path(), "postgresql").unwrap();

        let debug = format!("{:?}", config.database);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<redacted>"));
    }
}
