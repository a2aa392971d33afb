//! Duplicate reconciliation: in-sheet dedup and new-vs-existing partitioning

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::cell::CellValue;
use super::{SheetRef, SheetsBackend};
use crate::error::SyncError;

/// What to do with candidates whose key is already in the sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidatePolicy {
    /// Log them and skip them (default)
    #[default]
    Warn,
    /// Fail the sheet's sync
    Raise,
    /// Delete the existing rows so the candidates are inserted fresh
    Remove,
}

/// Candidates split against a key column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Not present, eligible for insertion
    pub missing: Vec<String>,
    /// Already present, never re-inserted
    pub existing: Vec<String>,
}

/// Repeated values in a column as `{row number -> value}`.
///
/// Rows before `start_row` (1-based) and blank cells are ignored. Without
/// `return_all` the first occurrence of each value is left out.
pub fn find_duplicates(values: &[String], start_row: u32, return_all: bool) -> BTreeMap<u32, String> {
    let rows = || {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (i as u32 + 1, v.trim()))
            .filter(|(row, v)| *row >= start_row && !v.is_empty())
    };

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for (_, v) in rows() {
        *counts.entry(v).or_default() += 1;
    }

    let mut seen = HashSet::new();
    let mut duplicates = BTreeMap::new();
    for (row, v) in rows() {
        if counts[v] < 2 {
            continue;
        }
        if return_all || !seen.insert(v) {
            duplicates.insert(row, v.to_string());
        }
    }
    duplicates
}

/// Partition `candidates` by presence in `existing_values`
pub fn reconcile(existing_values: &[String], candidates: &[String]) -> Reconciliation {
    let existing: HashSet<&str> = existing_values.iter().map(|v| v.trim()).collect();

    let mut result = Reconciliation::default();
    for candidate in candidates {
        if existing.contains(candidate.trim()) {
            result.existing.push(candidate.clone());
        } else {
            result.missing.push(candidate.clone());
        }
    }
    result
}

/// Keep the rows whose identifier (same position in `ids`) is in `missing`
pub fn filter_by_missing<T: Clone>(rows: &[T], ids: &[String], missing: &[String]) -> Vec<T> {
    let missing: HashSet<&str> = missing.iter().map(|v| v.trim()).collect();
    rows.iter()
        .zip(ids)
        .filter(|(_, id)| missing.contains(id.trim()))
        .map(|(row, _)| row.clone())
        .collect()
}

/// Remove all but the first occurrence of every repeated value in a key
/// column. Returns the number of rows removed.
pub async fn remove_duplicates_from_col(
    backend: &dyn SheetsBackend,
    sheet: &SheetRef,
    col_values: &[String],
    header_row: u32,
    trash: Option<&SheetRef>,
) -> Result<usize> {
    let duplicates = find_duplicates(col_values, header_row + 1, false);
    if duplicates.is_empty() {
        info!("{}: no duplicates found", sheet);
        return Ok(0);
    }

    warn!(
        "{}: removing {} duplicate row(s): {:?}",
        sheet,
        duplicates.len(),
        duplicates
    );
    let rows: Vec<u32> = duplicates.keys().copied().collect();
    relocate_rows(backend, sheet, &rows, trash).await?;
    Ok(rows.len())
}

/// Delete every data row whose key column value is in `values`.
/// Returns the number of rows removed.
pub async fn delete_rows_by_values(
    backend: &dyn SheetsBackend,
    sheet: &SheetRef,
    col_values: &[String],
    header_row: u32,
    values: &HashSet<String>,
    trash: Option<&SheetRef>,
) -> Result<usize> {
    let rows: Vec<u32> = col_values
        .iter()
        .enumerate()
        .map(|(i, v)| (i as u32 + 1, v.trim()))
        .filter(|(row, v)| *row > header_row && values.contains(*v))
        .map(|(row, _)| row)
        .collect();

    if rows.is_empty() {
        info!("{}: no matching rows to delete", sheet);
        return Ok(0);
    }

    info!("{}: deleting {} row(s): {:?}", sheet, rows.len(), rows);
    relocate_rows(backend, sheet, &rows, trash).await?;
    Ok(rows.len())
}

/// Apply `policy` to candidates already present in the key column
pub async fn apply_candidate_policy(
    backend: &dyn SheetsBackend,
    sheet: &SheetRef,
    col_values: &[String],
    header_row: u32,
    candidates: &[String],
    policy: CandidatePolicy,
    trash: Option<&SheetRef>,
) -> Result<()> {
    let data = data_rows(col_values, header_row);
    let present = reconcile(data, candidates).existing;
    if present.is_empty() {
        return Ok(());
    }

    match policy {
        CandidatePolicy::Warn => {
            warn!(
                "{}: {} candidate(s) already present and will be skipped: {:?}",
                sheet,
                present.len(),
                present
            );
            Ok(())
        }
        CandidatePolicy::Raise => Err(SyncError::DuplicateCandidates {
            sheet: sheet.title.clone(),
            values: present,
        }
        .into()),
        CandidatePolicy::Remove => {
            let values: HashSet<String> = present.iter().map(|v| v.trim().to_string()).collect();
            delete_rows_by_values(backend, sheet, col_values, header_row, &values, trash).await?;
            Ok(())
        }
    }
}

/// The part of a column below its header
pub fn data_rows(col_values: &[String], header_row: u32) -> &[String] {
    let skip = (header_row as usize).min(col_values.len());
    &col_values[skip..]
}

/// Copy rows to the trash sheet (when configured), then delete them in one call
async fn relocate_rows(
    backend: &dyn SheetsBackend,
    sheet: &SheetRef,
    rows: &[u32],
    trash: Option<&SheetRef>,
) -> Result<()> {
    if let Some(trash) = trash {
        let all = backend
            .all_values(sheet)
            .await
            .with_context(|| format!("Failed to read {} before relocating rows", sheet))?;
        let moved: Vec<Vec<CellValue>> = rows
            .iter()
            .filter_map(|&row| all.get(row as usize - 1))
            .map(|values| values.iter().map(|v| CellValue::parse(v.clone())).collect())
            .collect();

        if !moved.is_empty() {
            backend
                .append_rows(trash, &moved)
                .await
                .with_context(|| format!("Failed to move {} row(s) to {}", moved.len(), trash))?;
            info!("{}: moved {} row(s) to {}", sheet, moved.len(), trash);
        }
    }

    backend
        .delete_rows(sheet, rows)
        .await
        .with_context(|| format!("Failed to delete {} row(s) from {}", rows.len(), sheet))
}
