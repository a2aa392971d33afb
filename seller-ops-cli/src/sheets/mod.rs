//! Formula-preserving row insertion and duplicate reconciliation
//!
//! The engine only talks to spreadsheets through [`SheetsBackend`]; the
//! Google Sheets REST client lives in `crate::api::sheets`.

pub mod cell;
pub mod columns;
pub mod dedup;
pub mod inserter;
pub mod sync;
pub mod template;

#[cfg(test)]
pub mod memory;

pub use cell::CellValue;
pub use columns::{ColumnTarget, HeaderRow, TargetColumns, column_letter};
pub use dedup::CandidatePolicy;
pub use sync::{SyncOutcome, SyncRequest, sync_sheet};
pub use template::load_template;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt;

/// Address of one worksheet inside one spreadsheet
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SheetRef {
    /// Spreadsheet key as it appears in the document URL
    pub spreadsheet_id: String,
    /// Human-readable spreadsheet name, for logs
    pub spreadsheet_title: String,
    /// Worksheet (tab) title
    pub title: String,
}

impl SheetRef {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        spreadsheet_title: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            spreadsheet_title: spreadsheet_title.into(),
            title: title.into(),
        }
    }
}

impl fmt::Display for SheetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' in '{}'", self.title, self.spreadsheet_title)
    }
}

/// Grid facts of a worksheet, read fresh before each operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetProperties {
    /// Numeric sheet id used by grid-range requests
    pub sheet_id: i64,
    pub row_count: u32,
    pub column_count: u32,
}

/// How cell contents are rendered when read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRender {
    /// Displayed values
    Formatted,
    /// Formula text for formula cells, raw values otherwise
    Formula,
}

/// Inclusive 1-based row range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSpan {
    pub first: u32,
    pub last: u32,
}

impl RowSpan {
    pub fn new(first: u32, last: u32) -> Self {
        Self { first, last }
    }

    pub fn len(&self) -> u32 {
        self.last + 1 - self.first
    }

    pub fn is_empty(&self) -> bool {
        self.last < self.first
    }
}

/// A single-cell write, 1-based coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct CellUpdate {
    pub row: u32,
    pub col: u32,
    pub value: CellValue,
}

/// Spreadsheet operations the engine relies on.
///
/// Every method is one network round trip; batching is the caller's job.
#[async_trait]
pub trait SheetsBackend: Send + Sync {
    async fn properties(&self, sheet: &SheetRef) -> Result<SheetProperties>;

    /// One row, trailing empty cells trimmed
    async fn row_values(&self, sheet: &SheetRef, row: u32, render: ValueRender) -> Result<Vec<CellValue>>;

    /// One column by 1-based position, formatted, trailing empty cells trimmed
    async fn col_values(&self, sheet: &SheetRef, col: u32) -> Result<Vec<String>>;

    /// Whole sheet, formatted
    async fn all_values(&self, sheet: &SheetRef) -> Result<Vec<Vec<String>>>;

    /// Append rows below the last row, inserting grid rows as needed
    async fn append_rows(&self, sheet: &SheetRef, rows: &[Vec<CellValue>]) -> Result<()>;

    /// Paste the format (not values) of `source_row` onto every row of `target`
    async fn copy_format(&self, sheet: &SheetRef, source_row: u32, target: RowSpan) -> Result<()>;

    /// Delete the given 1-based rows
    async fn delete_rows(&self, sheet: &SheetRef, rows: &[u32]) -> Result<()>;

    async fn update_cells(&self, sheet: &SheetRef, updates: &[CellUpdate]) -> Result<()>;
}

/// Read the header row at `header_row`
pub async fn read_header(
    backend: &dyn SheetsBackend,
    sheet: &SheetRef,
    header_row: u32,
) -> Result<HeaderRow> {
    let cells = backend
        .row_values(sheet, header_row, ValueRender::Formatted)
        .await
        .with_context(|| format!("Failed to read header row {} of {}", header_row, sheet))?;

    Ok(HeaderRow::new(
        sheet.title.clone(),
        header_row,
        cells.iter().map(|c| c.to_string()).collect(),
    ))
}
