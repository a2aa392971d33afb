//! Batch insertion of rows that carry the sheet's formulas and formatting

use anyhow::{Context, Result, bail};
use log::{debug, error, info};

use super::cell::CellValue;
use super::columns::{HeaderRow, offset_column};
use super::template::{RowTemplate, load_template};
use super::{RowSpan, SheetRef, SheetsBackend};

/// Compose the rows to append, the first one landing on row `base_row`
pub fn compose_rows(
    template: &RowTemplate,
    rows: &[Vec<CellValue>],
    targets: &[usize],
    base_row: u32,
) -> Vec<Vec<CellValue>> {
    rows.iter()
        .enumerate()
        .map(|(i, values)| template.compose(base_row + i as u32, values, targets))
        .collect()
}

/// Append `rows` below the last row of `sheet` in a single call, replicating
/// the last row's formulas for each new row, then copy the last row's
/// format onto the whole new block in a second single call.
///
/// `targets` gives, positionally, the 0-based column each value of a row
/// lands in. Returns the number of rows appended. Failures are logged with
/// the sheet context and returned; nothing is retried here.
pub async fn insert_formatted_rows(
    backend: &dyn SheetsBackend,
    sheet: &SheetRef,
    header: &HeaderRow,
    rows: &[Vec<CellValue>],
    targets: &[usize],
    formula_columns: &[String],
) -> Result<usize> {
    if rows.is_empty() {
        info!("No rows to add to {}", sheet);
        return Ok(0);
    }

    if let Some(bad) = rows.iter().position(|r| r.len() != targets.len()) {
        bail!(
            "Row {} for {} has {} values but {} target columns",
            bad,
            sheet,
            rows[bad].len(),
            targets.len()
        );
    }

    info!("Adding {} formatted row(s) to {}", rows.len(), sheet);

    let template = load_template(backend, sheet, header).await?;
    template.validate_formula_columns(&sheet.title, header, formula_columns)?;

    let last_row = template.source_row();
    let base_row = last_row + 1;
    let composed = compose_rows(&template, rows, targets, base_row);
    let block = RowSpan::new(base_row, base_row + composed.len() as u32 - 1);
    let last_col = offset_column("A", template.width() as isize - 1).unwrap_or_else(|| "A".to_string());

    debug!(
        "{}: writing A{}:{}{} (template width {}, targets {:?})",
        sheet,
        block.first,
        last_col,
        block.last,
        template.width(),
        targets
    );

    if let Err(e) = backend.append_rows(sheet, &composed).await {
        error!(
            "Failed to append {} row(s) to {} (row count {}): {:#}",
            composed.len(),
            sheet,
            last_row,
            e
        );
        return Err(e).with_context(|| format!("Failed to append rows to {}", sheet));
    }
    info!("Data appended to {}", sheet);

    if last_row > header.row() {
        if let Err(e) = backend.copy_format(sheet, last_row, block).await {
            error!(
                "Failed to copy format of row {} onto rows {}-{} of {}: {:#}",
                last_row, block.first, block.last, sheet, e
            );
            return Err(e).with_context(|| format!("Failed to copy row format in {}", sheet));
        }
    } else {
        debug!("{}: no data row above the new block, format copy skipped", sheet);
    }

    info!("Successfully added {} row(s) with formatting to {}", composed.len(), sheet);
    Ok(composed.len())
}
