//! Excel copies of projected batches, kept for audit

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};
use std::path::Path;

use crate::sheets::CellValue;

/// Write `rows` under a bold header row to a fresh workbook at `path`
pub fn write_rows_xlsx(path: &Path, headers: &[String], rows: &[Vec<CellValue>]) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create export directory: {}", dir.display()))?;
    }

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    write_header(worksheet, headers)?;

    for (i, row) in rows.iter().enumerate() {
        let r = i as u32 + 1;
        for (c, cell) in row.iter().enumerate() {
            write_cell(worksheet, r, c as u16, cell)?;
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("Failed to save Excel file: {}", path.display()))?;
    Ok(())
}

fn write_header(ws: &mut Worksheet, headers: &[String]) -> Result<()> {
    let bold = rust_xlsxwriter::Format::new().set_bold();
    for (c, name) in headers.iter().enumerate() {
        ws.write_string_with_format(0, c as u16, name, &bold)?;
    }
    Ok(())
}

fn write_cell(ws: &mut Worksheet, row: u32, col: u16, cell: &CellValue) -> Result<()> {
    match cell {
        CellValue::Empty => {}
        CellValue::Number(n) => {
            ws.write_number(row, col, *n)?;
        }
        CellValue::Text(s) => {
            ws.write_string(row, col, s)?;
        }
        CellValue::Formula(f) => {
            ws.write_formula(row, col, f.as_str())?;
        }
    }
    Ok(())
}
