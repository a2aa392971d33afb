//! Row templates: the last row's formulas, parametrized by row number
//!
//! Writing through the values API never auto-extends formulas the way a
//! drag-fill does, so every insertion batch captures the formulas of the
//! sheet's last row and re-renders them for each new row.

use anyhow::{Context, Result};
use log::debug;

use super::cell::CellValue;
use super::columns::HeaderRow;
use super::{SheetRef, SheetsBackend, ValueRender};
use crate::error::SyncError;

/// Stands in for the template row's own number inside formula text
pub const ROW_PLACEHOLDER: &str = "{cell_num}";

/// Skeleton of a new row: formula cells carry [`ROW_PLACEHOLDER`], all other
/// cells are blank. Built fresh for each batch and dropped after it.
#[derive(Debug, Clone, PartialEq)]
pub struct RowTemplate {
    source_row: u32,
    cells: Vec<CellValue>,
}

impl RowTemplate {
    /// Template of `width` blank cells, used when there is no data row yet
    pub fn blank(width: usize, source_row: u32) -> Self {
        Self {
            source_row,
            cells: vec![CellValue::Empty; width],
        }
    }

    /// Build from the cells of row `row_number`, rendered as formulas.
    ///
    /// The template spans `width` columns, or further if the row carries
    /// formulas past the header's last named column.
    pub fn from_row(row: &[CellValue], row_number: u32, width: usize) -> Self {
        let last_formula = row.iter().rposition(CellValue::is_formula).map(|i| i + 1);
        let width = width.max(last_formula.unwrap_or(0));

        let cells = (0..width)
            .map(|i| match row.get(i) {
                Some(CellValue::Formula(f)) => {
                    CellValue::Formula(parametrize_formula(f, row_number))
                }
                _ => CellValue::Empty,
            })
            .collect();

        Self {
            source_row: row_number,
            cells,
        }
    }

    /// Row the template was taken from
    pub fn source_row(&self) -> u32 {
        self.source_row
    }

    pub fn width(&self) -> usize {
        self.cells.len()
    }

    /// 0-based indices of formula-bearing columns
    pub fn formula_columns(&self) -> Vec<usize> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_formula())
            .map(|(i, _)| i)
            .collect()
    }

    /// Check that every column the profile declares formula-bearing has one
    pub fn validate_formula_columns(
        &self,
        sheet: &str,
        header: &HeaderRow,
        formula_columns: &[String],
    ) -> Result<(), SyncError> {
        for name in formula_columns {
            let idx = header.index(name)?;
            if !self.cells.get(idx).is_some_and(CellValue::is_formula) {
                return Err(SyncError::FormulaProfileMismatch {
                    sheet: sheet.to_string(),
                    column: name.clone(),
                    row: self.source_row,
                });
            }
        }
        Ok(())
    }

    /// Compose row `row_number`: literal `values` at `targets`, formulas
    /// rendered for the new row everywhere else.
    pub fn compose(&self, row_number: u32, values: &[CellValue], targets: &[usize]) -> Vec<CellValue> {
        let mut row = self.cells.clone();
        for (&idx, value) in targets.iter().zip(values) {
            if idx >= row.len() {
                row.resize(idx + 1, CellValue::Empty);
            }
            row[idx] = value.clone();
        }

        row.into_iter()
            .map(|cell| match cell {
                CellValue::Formula(f) if f.contains(ROW_PLACEHOLDER) => {
                    CellValue::Formula(fill_placeholder(&f, row_number))
                }
                other => other,
            })
            .collect()
    }
}

/// Replace [`ROW_PLACEHOLDER`] with a concrete row number
pub fn fill_placeholder(template: &str, row_number: u32) -> String {
    template.replace(ROW_PLACEHOLDER, &row_number.to_string())
}

/// Swap references to `row_number` in a formula for [`ROW_PLACEHOLDER`].
///
/// Only the row part of relative A1 references is touched: string literals,
/// quoted sheet names, absolute rows (`A$5`), plain numbers and function
/// names such as `LOG10(` are copied verbatim.
pub fn parametrize_formula(formula: &str, row_number: u32) -> String {
    let row_text = row_number.to_string();
    let chars: Vec<char> = formula.chars().collect();
    let len = chars.len();
    let mut out = String::with_capacity(formula.len() + ROW_PLACEHOLDER.len());
    let mut i = 0;

    while i < len {
        let c = chars[i];

        if c == '"' || c == '\'' {
            let end = skip_quoted(&chars, i);
            out.extend(&chars[i..end]);
            i = end;
            continue;
        }

        if (c == '$' || c.is_ascii_alphabetic()) && !is_word_char(i.checked_sub(1).map(|p| chars[p])) {
            if let Some(reference) = scan_reference(&chars, i) {
                out.extend(&chars[i..reference.digits_start]);
                let digits: String = chars[reference.digits_start..reference.end].iter().collect();
                if !reference.row_absolute && digits == row_text {
                    out.push_str(ROW_PLACEHOLDER);
                } else {
                    out.push_str(&digits);
                }
                i = reference.end;
                continue;
            }
        }

        out.push(c);
        i += 1;
    }

    out
}

struct CellReference {
    digits_start: usize,
    end: usize,
    row_absolute: bool,
}

fn scan_reference(chars: &[char], start: usize) -> Option<CellReference> {
    let len = chars.len();
    let mut j = start;
    if chars[j] == '$' {
        j += 1;
    }

    let letters_start = j;
    while j < len && chars[j].is_ascii_alphabetic() {
        j += 1;
    }
    if !(1..=3).contains(&(j - letters_start)) {
        return None;
    }

    let row_absolute = j < len && chars[j] == '$';
    if row_absolute {
        j += 1;
    }

    let digits_start = j;
    while j < len && chars[j].is_ascii_digit() {
        j += 1;
    }
    if j == digits_start {
        return None;
    }
    if j < len && (is_word_char(Some(chars[j])) || chars[j] == '(') {
        return None;
    }

    Some(CellReference {
        digits_start,
        end: j,
        row_absolute,
    })
}

fn is_word_char(c: Option<char>) -> bool {
    c.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

/// Index just past the closing quote; doubled quotes are escapes
fn skip_quoted(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

/// Read the template for the next insertion batch from the sheet's last row
pub async fn load_template(
    backend: &dyn SheetsBackend,
    sheet: &SheetRef,
    header: &HeaderRow,
) -> Result<RowTemplate> {
    let props = backend
        .properties(sheet)
        .await
        .with_context(|| format!("Failed to read properties of {}", sheet))?;
    let last_row = props.row_count;

    if last_row <= header.row() {
        debug!("{} has no data rows below the header, using a blank template", sheet);
        return Ok(RowTemplate::blank(header.width(), last_row));
    }

    let cells = backend
        .row_values(sheet, last_row, ValueRender::Formula)
        .await
        .with_context(|| format!("Failed to read row {} of {}", last_row, sheet))?;

    let template = RowTemplate::from_row(&cells, last_row, header.width());
    debug!(
        "Template from row {} of {}: {} columns, formulas in {:?}",
        last_row,
        sheet,
        template.width(),
        template.formula_columns()
    );
    Ok(template)
}
