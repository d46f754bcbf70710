//! HTTP client for the product detail API
//!
//! One GET per product id against a URL template. The JSON body is mapped into
//! a [`ProductRecord`]; fields the payload omits become `None` instead of
//! failing the record.

use crate::config::ApiConfig;
use crate::error::{FetchError, IngestError, Result};
use crate::text::TextCleaner;
use async_trait::async_trait;
use chrono::Utc;
use prodsync_common::{ProductId, ProductRecord};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::debug;

/// Source of product records, keyed by id
#[async_trait]
pub trait ProductFetcher: Send + Sync {
    /// Fetch one product; no retries are made here
    async fn fetch(&self, id: ProductId) -> std::result::Result<ProductRecord, FetchError>;
}

/// API client for the product detail endpoint
pub struct ApiClient {
    client: Client,
    endpoint: String,
    cleaner: Option<TextCleaner>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        let cleaner = if config.clean_text {
            Some(
                TextCleaner::new()
                    .map_err(|e| IngestError::config(format!("text cleaner patterns: {}", e)))?,
            )
        } else {
            None
        };

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            cleaner,
        })
    }

    /// URL requested for `id`
    pub fn product_url(&self, id: ProductId) -> String {
        let id = id.to_string();
        self.endpoint.replace("{id}", &id).replace("{}", &id)
    }

    /// Get the endpoint template
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ProductFetcher for ApiClient {
    async fn fetch(&self, id: ProductId) -> std::result::Result<ProductRecord, FetchError> {
        let url = self.product_url(id);
        debug!(product_id = %id, url = %url, "Fetching product");

        let response = self.client.get(&url).send().await.map_err(describe_request_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(FetchError::NotFound {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            return Err(FetchError::transient(format!("unexpected HTTP status {}", status)));
        }

        let body = response.bytes().await.map_err(describe_request_error)?;

        let payload: ProductPayload = serde_json::from_slice(&body)
            .map_err(|e| FetchError::transient(format!("invalid JSON body: {}", e)))?;

        Ok(payload.into_record(id, self.cleaner.as_ref()))
    }
}

fn describe_request_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::transient(format!("request timed out: {}", err))
    } else if err.is_connect() {
        FetchError::transient(format!("connection failed: {}", err))
    } else {
        FetchError::transient(format!("request failed: {}", err))
    }
}

/// Subset of the product detail payload that gets persisted
#[derive(Debug, Deserialize)]
struct ProductPayload {
    name: Option<String>,
    url_key: Option<String>,
    #[serde(default, deserialize_with = "lenient_price")]
    price: Option<f64>,
    description: Option<String>,
    images: Option<Vec<ImagePayload>>,
}

#[derive(Debug, Deserialize)]
struct ImagePayload {
    base_url: Option<String>,
}

impl ProductPayload {
    fn into_record(self, id: ProductId, cleaner: Option<&TextCleaner>) -> ProductRecord {
        let clean = |value: Option<String>| match cleaner {
            Some(cleaner) => value.map(|text| cleaner.clean(&text)),
            None => value,
        };

        let image_url = self
            .images
            .and_then(|images| images.into_iter().next())
            .and_then(|image| image.base_url);

        ProductRecord {
            id,
            name: clean(self.name),
            url_key: self.url_key,
            price: self.price,
            description: clean(self.description),
            image_url,
            fetched_at: Utc::now(),
        }
    }
}

/// Accept a number or a numeric string; anything else is treated as absent
fn lenient_price<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;

    let price = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    // "NaN" and "inf" parse as f64 but are not prices
    Ok(price.filter(|p| p.is_finite()))
}
