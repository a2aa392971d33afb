//! New item cards read from the staging sheet

use anyhow::{Result, bail};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::sheets::HeaderRow;

/// Named fields of a new item card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardField {
    SupplierName,
    Sku,
    Client,
    SupplierCodeDuplicates,
    Status,
    ItemName,
    Category,
    SupplierCodeUnique,
    PurchasePrice,
    Manager,
}

impl CardField {
    pub const ALL: [CardField; 10] = [
        CardField::SupplierName,
        CardField::Sku,
        CardField::Client,
        CardField::SupplierCodeDuplicates,
        CardField::Status,
        CardField::ItemName,
        CardField::Category,
        CardField::SupplierCodeUnique,
        CardField::PurchasePrice,
        CardField::Manager,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardField::SupplierName => "supplier_name",
            CardField::Sku => "sku",
            CardField::Client => "client",
            CardField::SupplierCodeDuplicates => "supplier_code_duplicates",
            CardField::Status => "status",
            CardField::ItemName => "item_name",
            CardField::Category => "category",
            CardField::SupplierCodeUnique => "supplier_code_unique",
            CardField::PurchasePrice => "purchase_price",
            CardField::Manager => "manager",
        }
    }
}

impl fmt::Display for CardField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One staging row. Never mutated; downstream sheets get projections of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewItemCard {
    /// 1-based staging row the card was read from
    pub row: u32,
    fields: HashMap<CardField, String>,
}

impl NewItemCard {
    pub fn new(row: u32) -> Self {
        Self {
            row,
            fields: HashMap::new(),
        }
    }

    pub fn with(mut self, field: CardField, value: impl Into<String>) -> Self {
        self.fields.insert(field, value.into().trim().to_string());
        self
    }

    /// Field value, empty when the staging sheet has no such column
    pub fn get(&self, field: CardField) -> &str {
        self.fields.get(&field).map(String::as_str).unwrap_or("")
    }

    pub fn sku(&self) -> &str {
        self.get(CardField::Sku)
    }

    pub fn supplier_code(&self) -> &str {
        self.get(CardField::SupplierCodeUnique)
    }
}

/// Header names of the staging columns, per card field
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CardColumns {
    #[serde(default = "default_supplier_name")]
    pub supplier_name: String,
    #[serde(default = "default_sku")]
    pub sku: String,
    #[serde(default = "default_client")]
    pub client: String,
    #[serde(default = "default_supplier_code_duplicates")]
    pub supplier_code_duplicates: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default = "default_item_name")]
    pub item_name: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_supplier_code_unique")]
    pub supplier_code_unique: String,
    #[serde(default = "default_purchase_price")]
    pub purchase_price: String,
    #[serde(default = "default_manager")]
    pub manager: String,
}

fn default_supplier_name() -> String {
    "Поставщик".to_string()
}
fn default_sku() -> String {
    "Артикул".to_string()
}
fn default_client() -> String {
    "Клиент".to_string()
}
fn default_supplier_code_duplicates() -> String {
    "Артикул поставщика".to_string()
}
fn default_status() -> String {
    "Статус".to_string()
}
fn default_item_name() -> String {
    "Наименование".to_string()
}
fn default_category() -> String {
    "Предмет".to_string()
}
fn default_supplier_code_unique() -> String {
    "wild".to_string()
}
fn default_purchase_price() -> String {
    "Закупочная цена".to_string()
}
fn default_manager() -> String {
    "Ответственный менеджер".to_string()
}

impl Default for CardColumns {
    fn default() -> Self {
        Self {
            supplier_name: default_supplier_name(),
            sku: default_sku(),
            client: default_client(),
            supplier_code_duplicates: default_supplier_code_duplicates(),
            status: default_status(),
            item_name: default_item_name(),
            category: default_category(),
            supplier_code_unique: default_supplier_code_unique(),
            purchase_price: default_purchase_price(),
            manager: default_manager(),
        }
    }
}

impl CardColumns {
    pub fn header_for(&self, field: CardField) -> &str {
        match field {
            CardField::SupplierName => &self.supplier_name,
            CardField::Sku => &self.sku,
            CardField::Client => &self.client,
            CardField::SupplierCodeDuplicates => &self.supplier_code_duplicates,
            CardField::Status => &self.status,
            CardField::ItemName => &self.item_name,
            CardField::Category => &self.category,
            CardField::SupplierCodeUnique => &self.supplier_code_unique,
            CardField::PurchasePrice => &self.purchase_price,
            CardField::Manager => &self.manager,
        }
    }
}

/// Read the cards whose status equals `ready_status`.
///
/// `rows` is the whole staging sheet; the header sits at `header.row()`.
/// SKU and status columns are required, other missing columns read as empty.
/// Rows without a SKU are ignored.
pub fn read_cards(
    header: &HeaderRow,
    rows: &[Vec<String>],
    columns: &CardColumns,
    ready_status: &str,
) -> Result<Vec<NewItemCard>> {
    let sku_idx = header.index(&columns.sku)?;
    let status_idx = header.index(&columns.status)?;

    let mut indices = Vec::new();
    for field in CardField::ALL {
        match header.index(columns.header_for(field)) {
            Ok(idx) => indices.push((field, idx)),
            Err(_) => debug!("Staging column for {} not found, reading it as empty", field),
        }
    }

    let ready = ready_status.trim().to_lowercase();
    fn cell(row: &[String], idx: usize) -> String {
        row.get(idx).map(|v| v.trim()).unwrap_or("").to_string()
    }

    let cards: Vec<NewItemCard> = rows
        .iter()
        .enumerate()
        .skip(header.row() as usize)
        .filter(|(_, row)| !cell(row, sku_idx).is_empty())
        .filter(|(_, row)| cell(row, status_idx).to_lowercase() == ready)
        .map(|(i, row)| {
            indices.iter().fold(NewItemCard::new(i as u32 + 1), |card, &(field, idx)| {
                card.with(field, cell(row, idx))
            })
        })
        .collect();

    info!("Found {} staging row(s) with status '{}'", cards.len(), ready_status);
    Ok(cards)
}

/// First card per distinct value of `key`, in staging order.
/// Cards with an empty key are dropped.
pub fn collapse_on(cards: &[NewItemCard], key: CardField) -> Vec<&NewItemCard> {
    let mut seen = std::collections::HashSet::new();
    cards
        .iter()
        .filter(|card| {
            let value = card.get(key);
            !value.is_empty() && seen.insert(value.to_string())
        })
        .collect()
}

/// Distinct values of `key`, first-seen order
pub fn unique_values(cards: &[NewItemCard], key: CardField) -> Vec<String> {
    collapse_on(cards, key)
        .into_iter()
        .map(|card| card.get(key).to_string())
        .collect()
}

pub fn ensure_not_empty(cards: &[NewItemCard], sheet: &str, status: &str) -> Result<()> {
    if cards.is_empty() {
        bail!(crate::error::SyncError::NoReadyItems {
            sheet: sheet.to_string(),
            status: status.to_string(),
        });
    }
    Ok(())
}
