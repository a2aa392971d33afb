//! Per-sheet sync: clean duplicates, reconcile candidates, insert the rest

use anyhow::{Context, Result, bail};
use log::info;
use serde::Serialize;

use super::cell::CellValue;
use super::columns::TargetColumns;
use super::dedup::{
    CandidatePolicy, apply_candidate_policy, data_rows, filter_by_missing, find_duplicates,
    reconcile, remove_duplicates_from_col,
};
use super::inserter::insert_formatted_rows;
use super::{SheetRef, SheetsBackend, read_header};

/// Everything one sheet sync needs
#[derive(Debug, Clone)]
pub struct SyncRequest<'a> {
    pub sheet: &'a SheetRef,
    pub header_row: u32,
    /// Header name of the key column that identifiers are compared against
    pub comparison_column: &'a str,
    pub rows: &'a [Vec<CellValue>],
    pub targets: &'a TargetColumns,
    /// Key of each row in `rows`, same order; `None` inserts every row
    pub identifiers: Option<&'a [String]>,
    pub trash: Option<&'a SheetRef>,
    pub policy: CandidatePolicy,
    pub formula_columns: &'a [String],
    /// Reconcile and report, but write nothing
    pub dry_run: bool,
}

/// What a sheet sync did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncOutcome {
    pub removed_duplicates: usize,
    pub inserted: usize,
    /// Identifiers already present, left alone
    pub skipped: Vec<String>,
    /// Rows a dry run would have inserted
    pub planned: usize,
}

/// Sync one sheet.
///
/// In-sheet duplicates of the comparison column are always removed first so
/// a stale duplicate can never hide a new identifier or shift the positional
/// match between identifiers and rows. Then only the rows whose identifier
/// is missing from the (re-read) column are inserted.
pub async fn sync_sheet(backend: &dyn SheetsBackend, req: &SyncRequest<'_>) -> Result<SyncOutcome> {
    let sheet = req.sheet;
    let header = read_header(backend, sheet, req.header_row).await?;
    let targets = req.targets.resolve(&header)?;
    let col = header.position(req.comparison_column)?;

    if let Some(ids) = req.identifiers
        && ids.len() != req.rows.len()
    {
        bail!(
            "{}: {} identifiers for {} rows",
            sheet,
            ids.len(),
            req.rows.len()
        );
    }

    let mut outcome = SyncOutcome::default();
    let read_column = move || async move {
        backend
            .col_values(sheet, col)
            .await
            .with_context(|| format!("Failed to read column '{}' of {}", req.comparison_column, sheet))
    };

    let mut col_values = read_column().await?;
    if req.dry_run {
        outcome.removed_duplicates = find_duplicates(&col_values, req.header_row + 1, false).len();
    } else {
        outcome.removed_duplicates =
            remove_duplicates_from_col(backend, sheet, &col_values, req.header_row, req.trash).await?;
    }

    let to_insert: Vec<Vec<CellValue>> = match req.identifiers {
        Some(ids) => {
            if !req.dry_run {
                col_values = read_column().await?;
                if req.policy != CandidatePolicy::Warn {
                    apply_candidate_policy(
                        backend,
                        sheet,
                        &col_values,
                        req.header_row,
                        ids,
                        req.policy,
                        req.trash,
                    )
                    .await?;
                }
                if req.policy == CandidatePolicy::Remove {
                    col_values = read_column().await?;
                }
            }

            let rec = reconcile(data_rows(&col_values, req.header_row), ids);
            if !rec.existing.is_empty() {
                info!(
                    "Skipping {} value(s) already in {}: {:?}",
                    rec.existing.len(),
                    sheet,
                    rec.existing
                );
            }
            outcome.skipped = rec.existing;

            if rec.missing.is_empty() {
                info!("No new values to add to {}", sheet);
                return Ok(outcome);
            }
            filter_by_missing(req.rows, ids, &rec.missing)
        }
        None => req.rows.to_vec(),
    };

    if req.dry_run {
        info!("[dry run] would add {} row(s) to {}", to_insert.len(), sheet);
        outcome.planned = to_insert.len();
        return Ok(outcome);
    }

    outcome.inserted =
        insert_formatted_rows(backend, sheet, &header, &to_insert, &targets, req.formula_columns).await?;
    Ok(outcome)
}
