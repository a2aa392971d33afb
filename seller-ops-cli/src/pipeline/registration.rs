//! Catalog branch: register supplier codes the products table does not know yet

use anyhow::{Context, Result};
use log::{error, info};
use regex::Regex;
use serde::Serialize;

use crate::api::{ProductCatalog, ProductDraft, ProductLookup};

use super::card::{CardField, NewItemCard, collapse_on};

/// A code that could not be registered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedCode {
    pub code: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistrationOutcome {
    pub registered: Vec<String>,
    pub failed: Vec<FailedCode>,
    /// Codes carrying the duplicate marker, never registered
    pub duplicates: Vec<String>,
    pub already_present: usize,
    /// Codes a dry run would have registered
    pub planned: Vec<String>,
}

impl RegistrationOutcome {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty() || !self.duplicates.is_empty()
    }
}

/// Register every unique supplier code of `cards` missing from the catalog.
///
/// Only the existence check can fail the branch; lookup and creation errors
/// are collected per code.
pub async fn register_missing(
    catalog: &dyn ProductCatalog,
    lookup: &dyn ProductLookup,
    cards: &[NewItemCard],
    duplicate_pattern: &Regex,
    dry_run: bool,
) -> Result<RegistrationOutcome> {
    let unique = collapse_on(cards, CardField::SupplierCodeUnique);
    let codes: Vec<String> = unique.iter().map(|c| c.supplier_code().to_string()).collect();

    let existing = catalog
        .existing_ids(&codes)
        .await
        .context("Failed to check products for existing codes")?;

    let mut outcome = RegistrationOutcome {
        already_present: existing.len(),
        ..Default::default()
    };

    let missing: Vec<&NewItemCard> = unique
        .into_iter()
        .filter(|card| !existing.contains(card.supplier_code()))
        .collect();
    if missing.is_empty() {
        info!("No codes missing from products");
        return Ok(outcome);
    }

    let (duplicates, missing): (Vec<&NewItemCard>, Vec<&NewItemCard>) = missing
        .into_iter()
        .partition(|card| duplicate_pattern.is_match(card.supplier_code()));
    outcome.duplicates = duplicates.iter().map(|c| c.supplier_code().to_string()).collect();
    if !outcome.duplicates.is_empty() {
        error!("Duplicate-marked codes will not be registered: {:?}", outcome.duplicates);
    }

    info!(
        "Codes missing from products: {:?}",
        missing.iter().map(|c| c.supplier_code()).collect::<Vec<_>>()
    );

    for card in missing {
        let code = card.supplier_code();
        if dry_run {
            outcome.planned.push(code.to_string());
            continue;
        }

        match register_one(catalog, lookup, card).await {
            Ok(()) => outcome.registered.push(code.to_string()),
            Err(e) => {
                error!("Failed to add {} to products: {:#}", code, e);
                outcome.failed.push(FailedCode {
                    code: code.to_string(),
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    if !outcome.failed.is_empty() {
        info!(
            "Codes that could not be added to products: {:?}",
            outcome.failed.iter().map(|f| f.code.as_str()).collect::<Vec<_>>()
        );
    }
    Ok(outcome)
}

async fn register_one(
    catalog: &dyn ProductCatalog,
    lookup: &dyn ProductLookup,
    card: &NewItemCard,
) -> Result<()> {
    let code = card.supplier_code();
    let metadata = lookup.card(card.get(CardField::Client), code).await?;

    let name = match card.get(CardField::ItemName) {
        "" => metadata.title.unwrap_or_default(),
        name => name.to_string(),
    };
    catalog
        .create_product(&ProductDraft::single(code, name, metadata.photo_url))
        .await
}
