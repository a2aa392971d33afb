//! Product catalog: existence in the operations database, creation over HTTP

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde::Serialize;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashSet;

use super::check_status;

pub const ADD_PRODUCT_PATH: &str = "/api/goods_information/add_product";

/// Body item of the add-product call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductDraft {
    /// Unique supplier code
    pub id: String,
    pub name: String,
    pub is_kit: bool,
    pub share_of_kit: bool,
    pub photo_link: String,
    pub kit_components: Option<Vec<String>>,
}

impl ProductDraft {
    /// A single (non-kit) product
    pub fn single(id: impl Into<String>, name: impl Into<String>, photo_link: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_kit: false,
            share_of_kit: false,
            photo_link: photo_link.into(),
            kit_components: None,
        }
    }
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// The subset of `ids` the catalog already knows
    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>>;

    async fn product_exists(&self, id: &str) -> Result<bool> {
        Ok(self.existing_ids(&[id.to_string()]).await?.contains(id))
    }

    /// Register one product; any non-200 answer is an error
    async fn create_product(&self, draft: &ProductDraft) -> Result<()>;
}

/// Catalog backed by the `products` table and the goods-information service
#[derive(Debug, Clone)]
pub struct CatalogClient {
    pool: PgPool,
    http: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    /// The pool connects on first use
    pub fn new(database_url: &str, base_url: impl Into<String>, http: reqwest::Client) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_lazy(database_url)
            .context("Invalid catalog database URL")?;

        Ok(Self {
            pool,
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ProductCatalog for CatalogClient {
    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let rows = sqlx::query("SELECT id FROM products WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query products")?;

        let mut found = HashSet::new();
        for row in rows {
            found.insert(row.try_get::<String, _>("id")?);
        }
        debug!("{} of {} id(s) already in products", found.len(), ids.len());
        Ok(found)
    }

    async fn create_product(&self, draft: &ProductDraft) -> Result<()> {
        let url = format!("{}{}", self.base_url, ADD_PRODUCT_PATH);
        let response = self
            .http
            .post(&url)
            .json(&[draft])
            .send()
            .await
            .with_context(|| format!("Failed to send add_product for {}", draft.id))?;

        check_status("add_product", response).await?;
        info!("Sent request to create {} in products", draft.id);
        Ok(())
    }
}
