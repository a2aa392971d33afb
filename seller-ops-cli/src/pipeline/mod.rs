//! Scheduled jobs built on the sheet sync engine
//!
//! `add-items` reads the ready cards from the staging sheet, fans them out to
//! every downstream sheet profile and registers new supplier codes in the
//! product catalog. `delete-items` removes flagged SKUs from the target
//! sheets. Neither job keeps state between runs: everything is re-derived
//! from the sheets each time.

pub mod card;
pub mod delete;
pub mod export;
pub mod projection;
pub mod registration;
pub mod report;

pub use card::NewItemCard;
pub use delete::DeleteItemsJob;
pub use projection::project;
pub use registration::register_missing;
pub use report::{RunReport, SheetReport};

use anyhow::{Context, Result};
use log::{error, info, warn};
use regex::Regex;

use crate::api::{ProductCatalog, ProductLookup};
use crate::config::{Config, SheetProfile};
use crate::error::{is_schema_drift, is_sheet_local};
use crate::sheets::{CellUpdate, CellValue, SheetRef, SheetsBackend, SyncOutcome, SyncRequest, read_header, sync_sheet};

pub const ADD_ITEMS_JOB: &str = "add_new_items";
pub const DELETE_ITEMS_JOB: &str = "delete_items";

/// Product catalog collaborators used after the sheet fan-out
pub struct CatalogBranch<'a> {
    pub catalog: &'a dyn ProductCatalog,
    pub lookup: &'a dyn ProductLookup,
    pub duplicate_pattern: Regex,
}

pub struct NewItemPipeline<'a> {
    backend: &'a dyn SheetsBackend,
    config: &'a Config,
    catalog: Option<CatalogBranch<'a>>,
}

impl<'a> NewItemPipeline<'a> {
    pub fn new(backend: &'a dyn SheetsBackend, config: &'a Config) -> Self {
        Self {
            backend,
            config,
            catalog: None,
        }
    }

    pub fn with_catalog(mut self, branch: CatalogBranch<'a>) -> Self {
        self.catalog = Some(branch);
        self
    }

    /// Read the ready cards from the staging sheet. An empty batch is an error.
    pub async fn load_cards(&self) -> Result<Vec<NewItemCard>> {
        let staging = &self.config.staging;
        let sheet = self.config.staging_ref()?;

        let header = read_header(self.backend, &sheet, staging.header_row).await?;
        let rows = self
            .backend
            .all_values(&sheet)
            .await
            .with_context(|| format!("Failed to read staging sheet {}", sheet))?;

        let cards = card::read_cards(&header, &rows, &staging.columns, &staging.ready_status)?;
        card::ensure_not_empty(&cards, &staging.sheet, &staging.ready_status)?;
        Ok(cards)
    }

    /// One full run. Returns `Err` only when the run's premises fail (no
    /// ready cards, unreadable staging sheet); sheet and item failures are
    /// recorded in the report.
    pub async fn run(&self, dry_run: bool) -> Result<RunReport> {
        let mut report = RunReport::start(ADD_ITEMS_JOB, dry_run);
        info!("Starting {} run {}{}", ADD_ITEMS_JOB, report.run_id, if dry_run { " (dry run)" } else { "" });

        let cards = self.load_cards().await?;
        let trash = self.config.trash_ref()?;

        for profile in &self.config.profiles {
            match self.sync_profile(profile, &cards, trash.as_ref(), dry_run).await {
                Ok(outcome) => report.sheets.push(SheetReport::ok(&profile.name, &profile.sheet, outcome)),
                Err(e) => {
                    report.sheets.push(SheetReport::failed(&profile.name, &profile.sheet, &e));
                    if is_schema_drift(&e) {
                        error!("Schema drift in '{}', skipping the sheet: {:#}", profile.sheet, e);
                    } else if is_sheet_local(&e) {
                        error!("Rejected candidates in '{}', skipping the sheet: {:#}", profile.sheet, e);
                    } else if self.config.run.continue_on_sheet_error {
                        error!("Failed to sync '{}', continuing: {:#}", profile.sheet, e);
                    } else {
                        error!("Failed to sync '{}', aborting the run: {:#}", profile.sheet, e);
                        report.aborted = Some(format!("sync of '{}' failed", profile.sheet));
                        break;
                    }
                }
            }
        }

        if report.aborted.is_none()
            && let Some(branch) = &self.catalog
        {
            match register_missing(branch.catalog, branch.lookup, &cards, &branch.duplicate_pattern, dry_run).await {
                Ok(outcome) => report.registration = Some(outcome),
                Err(e) => {
                    error!("Catalog registration failed: {:#}", e);
                    report.registration_error = Some(format!("{:#}", e));
                }
            }
        }

        if let Some(status) = &self.config.staging.mark_done_status {
            if dry_run || report.has_failures() {
                info!("Leaving staging statuses unchanged");
            } else {
                match self.mark_done(&cards, status).await {
                    Ok(count) => report.marked_done = count,
                    Err(e) => {
                        error!("Staging statuses not updated: {:#}", e);
                        report.mark_done_error = Some(format!("{:#}", e));
                    }
                }
            }
        }

        report.finish();
        Ok(report)
    }

    async fn sync_profile(
        &self,
        profile: &SheetProfile,
        cards: &[NewItemCard],
        trash: Option<&SheetRef>,
        dry_run: bool,
    ) -> Result<SyncOutcome> {
        let sheet = self.config.profile_ref(profile)?;
        let targets = profile.targets()?;
        let projection = project(profile, cards);
        info!("Syncing {} row(s) to {} (profile '{}')", projection.len(), sheet, profile.name);

        if let Some(path) = &profile.export_xlsx {
            let headers: Vec<String> = profile.values().iter().map(|v| v.label()).collect();
            match export::write_rows_xlsx(path, &headers, &projection.rows) {
                Ok(()) => info!("Saved {} row(s) to {}", projection.len(), path.display()),
                Err(e) => warn!("Export for '{}' failed: {:#}", profile.name, e),
            }
        }

        let request = SyncRequest {
            sheet: &sheet,
            header_row: profile.header_row,
            comparison_column: &profile.comparison_column,
            rows: &projection.rows,
            targets: &targets,
            identifiers: profile.reconcile.then_some(projection.identifiers.as_slice()),
            trash,
            policy: profile.policy,
            formula_columns: &profile.formula_columns,
            dry_run,
        };
        sync_sheet(self.backend, &request)
            .await
            .with_context(|| format!("profile '{}'", profile.name))
    }

    /// Write `status` into the status cell of every card's staging row, one call
    async fn mark_done(&self, cards: &[NewItemCard], status: &str) -> Result<usize> {
        let staging = &self.config.staging;
        let sheet = self.config.staging_ref()?;
        let header = read_header(self.backend, &sheet, staging.header_row).await?;
        let col = header.position(&staging.columns.status)?;

        let updates: Vec<CellUpdate> = cards
            .iter()
            .map(|card| CellUpdate {
                row: card.row,
                col,
                value: CellValue::Text(status.to_string()),
            })
            .collect();

        self.backend
            .update_cells(&sheet, &updates)
            .await
            .with_context(|| format!("Failed to mark staging rows as '{}'", status))?;
        info!("Marked {} staging row(s) as '{}'", updates.len(), status);
        Ok(updates.len())
    }
}
