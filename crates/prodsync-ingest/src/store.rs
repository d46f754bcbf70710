//! Record store
//!
//! The products table is both the destination of ingested records and the
//! resume checkpoint: an id that is already present is never fetched again.
//! Rows are immutable once inserted; a second insert for the same id fails with
//! [`StoreError::DuplicateKey`] instead of overwriting.

use crate::config::DatabaseConfig;
use crate::error::{IngestError, Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prodsync_common::{ProductId, ProductRecord};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence used by the ingestion pipeline
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Whether a record for `id` is already persisted
    async fn exists(&self, id: ProductId) -> StoreResult<bool>;

    /// Insert a new record; fails with `DuplicateKey` if the id is taken
    async fn insert(&self, record: &ProductRecord) -> StoreResult<()>;
}

/// PostgreSQL record store
pub struct PgRecordStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: Option<String>,
    url_key: Option<String>,
    price: Option<f64>,
    description: Option<String>,
    image_url: Option<String>,
    fetched_at: DateTime<Utc>,
}

impl From<ProductRow> for ProductRecord {
    fn from(row: ProductRow) -> Self {
        ProductRecord {
            id: ProductId::new(row.id),
            name: row.name,
            url_key: row.url_key,
            price: row.price,
            description: row.description,
            image_url: row.image_url,
            fetched_at: row.fetched_at,
        }
    }
}

impl PgRecordStore {
    /// Open the connection pool and verify the database is reachable
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(config.connect_options())
            .await
            .map_err(|e| {
                IngestError::config(format!(
                    "cannot connect to database '{}' on {}:{}: {}",
                    config.database, config.host, config.port, e
                ))
            })?;

        info!(
            host = %config.host,
            database = %config.database,
            max_connections = config.max_connections,
            "Database connection pool created"
        );

        Ok(Self { pool })
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Load a stored record
    pub async fn get(&self, id: ProductId) -> StoreResult<Option<ProductRecord>> {
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, name, url_key, price::float8 AS price, description, image_url, fetched_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ProductRecord::from))
    }

    /// Number of stored records
    pub async fn count(&self) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Release every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn exists(&self, id: ProductId) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)",
        )
        .bind(id.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn insert(&self, record: &ProductRecord) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO products (
                id, name, url_key, price, description, image_url, missing_fields, fetched_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id.get())
        .bind(record.name.as_deref())
        .bind(record.url_key.as_deref())
        .bind(record.price)
        .bind(record.description.as_deref())
        .bind(record.image_url.as_deref())
        .bind(record.missing_fields().join(","))
        .bind(record.fetched_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::DuplicateKey(record.id))
            },
            Err(e) => Err(e.into()),
        }
    }
}
