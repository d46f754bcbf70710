//! PostgreSQL record store tests
//!
//! Run with: cargo test -p prodsync-ingest --test pg_store_tests -- --ignored

mod common;

use anyhow::Result;
use common::{init_tracing, TestPostgres};
use prodsync_common::{ProductId, ProductRecord};
use prodsync_ingest::{PgRecordStore, RecordStore, StoreError};
use serial_test::serial;

fn record(id: i64) -> ProductRecord {
    ProductRecord {
        name: Some("Bình đun siêu tốc".to_string()),
        url_key: Some(format!("binh-dun-p{id}")),
        price: Some(259000.0),
        description: Some("Dung tích 1.7L".to_string()),
        image_url: Some("https://salt.tikicdn.com/a.jpg".to_string()),
        ..ProductRecord::empty(ProductId::new(id))
    }
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker
async fn test_insert_then_exists() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let store = pg.store();

    let id = ProductId::new(184059211);
    assert!(!store.exists(id).await?);

    store.insert(&record(id.get())).await?;

    assert!(store.exists(id).await?);
    assert_eq!(store.count().await?, 1);

    let stored = store.get(id).await?.expect("record should be stored");
    assert_eq!(stored.name.as_deref(), Some("Bình đun siêu tốc"));
    assert_eq!(stored.price, Some(259000.0));
    assert_eq!(stored.image_url.as_deref(), Some("https://salt.tikicdn.com/a.jpg"));

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker
async fn test_second_insert_is_duplicate_key() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let store = pg.store();

    store.insert(&record(7)).await?;

    let mut changed = record(7);
    changed.name = Some("overwritten".to_string());
    let err = store.insert(&changed).await.unwrap_err();

    assert!(matches!(err, StoreError::DuplicateKey(id) if id == ProductId::new(7)));
    let stored = store.get(ProductId::new(7)).await?.expect("record should be stored");
    assert_eq!(stored.name.as_deref(), Some("Bình đun siêu tốc"));

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker
async fn test_partial_record_stores_nulls_and_missing_fields() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let store = pg.store();

    let partial = ProductRecord {
        name: Some("X".to_string()),
        ..ProductRecord::empty(ProductId::new(3))
    };
    store.insert(&partial).await?;

    let stored = store.get(ProductId::new(3)).await?.expect("record should be stored");
    assert_eq!(stored.name.as_deref(), Some("X"));
    assert_eq!(stored.price, None);
    assert_eq!(stored.url_key, None);

    let missing: String = sqlx::query_scalar("SELECT missing_fields FROM products WHERE id = 3")
        .fetch_one(store.pool())
        .await?;
    assert_eq!(missing, "url_key,price,description,image_url");

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker
async fn test_migrate_is_idempotent() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;

    // TestPostgres already migrated once
    pg.store().migrate().await?;

    let second = PgRecordStore::connect(pg.config()).await?;
    second.migrate().await?;
    second.close().await;

    assert_eq!(pg.store().count().await?, 0);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker
async fn test_connect_failure_is_config_error() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;

    let mut config = pg.config().clone();
    config.database = "no_such_database".to_string();
    config.connect_timeout_secs = 2;

    let err = PgRecordStore::connect(&config).await.err().expect("connect should fail");
    assert!(matches!(err, prodsync_ingest::IngestError::Config(_)));

    Ok(())
}
