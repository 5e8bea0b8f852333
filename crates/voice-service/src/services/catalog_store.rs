//! Catalog store collaborator.
//!
//! Rows go to a PostgREST table (`/rest/v1/{table}`) with
//! `Prefer: return=representation`, so the inserted row comes back with
//! its generated id.

use super::object_storage::check_response;
use crate::errors::CollaboratorError;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use voice_protocol::ProductRecord;

/// Timeout for one insert request.
const CATALOG_REQUEST_TIMEOUT_SECS: u64 = 15;

/// A product about to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProduct {
    pub name: String,
    pub brand: String,
    pub category: String,
    pub price: f64,
    pub image_url: String,
    pub embedding: Vec<f32>,
}

/// A product as stored, without its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProduct {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub price: f64,
    pub image_url: String,
}

impl From<StoredProduct> for ProductRecord {
    fn from(product: StoredProduct) -> Self {
        ProductRecord::new(
            product.id,
            product.name,
            product.brand,
            product.price,
            product.image_url,
        )
        .with_category(product.category)
    }
}

/// Tables may key products by integer or uuid; both surface as strings.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

/// Persistent product catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert(&self, product: &NewProduct) -> Result<StoredProduct, CollaboratorError>;
}

/// PostgREST-backed catalog (Supabase database).
#[derive(Clone)]
pub struct SupabaseCatalog {
    client: Client,
    base_url: String,
    service_key: SecretString,
    table: String,
}

impl SupabaseCatalog {
    /// # Errors
    ///
    /// Returns `CollaboratorError::Unavailable` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        service_key: SecretString,
        table: impl Into<String>,
    ) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(CATALOG_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| CollaboratorError::Unavailable(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key,
            table: table.into(),
        })
    }
}

#[async_trait]
impl CatalogStore for SupabaseCatalog {
    #[instrument(skip_all, name = "vs.services.catalog.insert", fields(table = %self.table))]
    async fn insert(&self, product: &NewProduct) -> Result<StoredProduct, CollaboratorError> {
        let key = self.service_key.expose_secret();
        let request = self
            .client
            .post(format!("{}/rest/v1/{}", self.base_url, self.table))
            .header("apikey", key)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {key}"))
            .header("Prefer", "return=representation")
            .json(product);

        let response = check_response(request.send().await, "catalog").await?;
        let rows: Vec<StoredProduct> = response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))?;

        let stored = rows.into_iter().next().ok_or_else(|| {
            CollaboratorError::InvalidResponse("insert returned no rows".to_string())
        })?;
        debug!(target: "vs.services", product_id = %stored.id, "Product inserted");
        Ok(stored)
    }
}
