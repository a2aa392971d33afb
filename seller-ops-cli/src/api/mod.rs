//! HTTP and database collaborators
//!
//! The Google Sheets client implements [`crate::sheets::SheetsBackend`]; the
//! product catalog and marketplace lookup sit behind their own traits so the
//! pipeline can run against in-memory fakes.

pub mod catalog;
pub mod marketplace;
pub mod resilience;
pub mod sheets;

pub use catalog::{CatalogClient, ProductCatalog, ProductDraft};
pub use marketplace::{CardMetadata, MarketplaceClient, ProductLookup, TokenStore};
pub use resilience::{ResilienceConfig, RetryConfig, RetryPolicy};
pub use sheets::GoogleSheetsClient;

use anyhow::Result;
use thiserror::Error;

/// Non-success HTTP response, kept typed so retry classification can see it
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{operation} failed with HTTP {status}: {body}")]
pub struct HttpStatusError {
    pub operation: String,
    pub status: u16,
    pub body: String,
}

/// Pass successful responses through, turn the rest into [`HttpStatusError`]
pub async fn check_status(operation: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(HttpStatusError {
        operation: operation.to_string(),
        status: status.as_u16(),
        body,
    }
    .into())
}

/// Shared reqwest client honoring the configured timeout
pub fn http_client(config: &ResilienceConfig) -> Result<reqwest::Client> {
    use anyhow::Context;

    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .user_agent(concat!("seller-ops/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}
