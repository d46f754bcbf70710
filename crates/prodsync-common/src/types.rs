//! Domain types shared across prodsync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of one product in the remote catalogue
///
/// Stored as the `BIGINT` primary key of the products table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(i64);

impl ProductId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for ProductId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a string is not a valid product id
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid product id '{0}': expected an integer")]
pub struct ParseProductIdError(pub String);

impl FromStr for ProductId {
    type Err = ParseProductIdError;

    /// Parses an integer id, tolerating surrounding whitespace and integral
    /// float renderings such as `"123.0"` produced by spreadsheet exports.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        if let Ok(value) = trimmed.parse::<i64>() {
            return Ok(Self(value));
        }

        match trimmed.parse::<f64>() {
            Ok(value)
                if value.is_finite()
                    && value.fract() == 0.0
                    && value >= i64::MIN as f64
                    && value < i64::MAX as f64 =>
            {
                Ok(Self(value as i64))
            },
            _ => Err(ParseProductIdError(s.to_string())),
        }
    }
}

/// Flattened product as persisted in the record store
///
/// Every field except `id` and `fetched_at` may be absent in the API payload;
/// absent fields are stored as NULL rather than rejecting the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: Option<String>,
    pub url_key: Option<String>,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl ProductRecord {
    /// Names of the optional columns, in table order
    pub const OPTIONAL_FIELDS: [&'static str; 5] =
        ["name", "url_key", "price", "description", "image_url"];

    /// Create a record with every optional field empty
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            name: None,
            url_key: None,
            price: None,
            description: None,
            image_url: None,
            fetched_at: Utc::now(),
        }
    }

    /// Optional fields that are absent or hold an empty string
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let blank = |value: &Option<String>| value.as_deref().is_none_or(str::is_empty);

        let present = [
            !blank(&self.name),
            !blank(&self.url_key),
            self.price.is_some(),
            !blank(&self.description),
            !blank(&self.image_url),
        ];

        Self::OPTIONAL_FIELDS
            .iter()
            .zip(present)
            .filter(|(_, present)| !present)
            .map(|(field, _)| *field)
            .collect()
    }
}

/// Closed set of reasons an ID did not end up stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The API answered 404 for this product
    NotFound,
    /// Network failure, timeout, unexpected status or unparseable body
    Transient,
    /// The record already exists in the store
    Duplicate,
    /// Anything that does not fit the other kinds
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotFound => "not_found",
            FailureKind::Transient => "transient",
            FailureKind::Duplicate => "duplicate",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the failure log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub product_id: ProductId,
    pub kind: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Number of fetch attempts made before giving up
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

impl FailureEntry {
    pub fn new(product_id: ProductId, kind: FailureKind, message: Option<String>) -> Self {
        Self {
            product_id,
            kind,
            message,
            attempts: 1,
            timestamp: Utc::now(),
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}
