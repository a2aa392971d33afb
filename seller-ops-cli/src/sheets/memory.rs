//! In-memory [`SheetsBackend`] for tests

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{CellUpdate, CellValue, RowSpan, SheetProperties, SheetRef, SheetsBackend, ValueRender};

#[derive(Debug, Default)]
struct Grid {
    sheet_id: i64,
    rows: Vec<Vec<CellValue>>,
    /// Format tag per row; appended rows have none until a format copy
    formats: Vec<Option<String>>,
}

#[derive(Debug, Default)]
struct State {
    sheets: HashMap<(String, String), Grid>,
    calls: HashMap<&'static str, usize>,
    failing: HashSet<&'static str>,
}

/// Sheets held in memory, counting every call per method
#[derive(Debug, Default)]
pub struct MemorySheets {
    state: Mutex<State>,
}

fn key(sheet: &SheetRef) -> (String, String) {
    (sheet.spreadsheet_id.clone(), sheet.title.clone())
}

fn trim_trailing(mut cells: Vec<CellValue>) -> Vec<CellValue> {
    while cells.last().is_some_and(CellValue::is_empty) {
        cells.pop();
    }
    cells
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a worksheet seeded with `rows`; cells starting with `=` are formulas
    pub fn add_sheet(&self, spreadsheet_title: &str, title: &str, rows: Vec<Vec<&str>>) -> SheetRef {
        let sheet = SheetRef::new(format!("mem-{}", spreadsheet_title), spreadsheet_title, title);
        let mut state = self.state.lock().unwrap();
        let sheet_id = state.sheets.len() as i64;
        let formats = (1..=rows.len()).map(|n| Some(format!("row-{}", n))).collect();
        let rows = rows
            .into_iter()
            .map(|r| r.into_iter().map(CellValue::parse).collect())
            .collect();
        state.sheets.insert(key(&sheet), Grid { sheet_id, rows, formats });
        sheet
    }

    /// Every row rendered as text, as stored
    pub fn values(&self, sheet: &SheetRef) -> Vec<Vec<String>> {
        let state = self.state.lock().unwrap();
        state.sheets[&key(sheet)]
            .rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    /// Raw cells of 1-based row `n`
    pub fn row(&self, sheet: &SheetRef, n: u32) -> Vec<CellValue> {
        let state = self.state.lock().unwrap();
        state.sheets[&key(sheet)].rows[n as usize - 1].clone()
    }

    /// Format tag of 1-based row `n`
    pub fn format(&self, sheet: &SheetRef, n: u32) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.sheets[&key(sheet)].formats[n as usize - 1].clone()
    }

    pub fn calls(&self, method: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.calls.get(method).copied().unwrap_or(0)
    }

    /// Make the next call to `method` fail
    pub fn fail_next(&self, method: &'static str) {
        self.state.lock().unwrap().failing.insert(method);
    }

    fn with_grid<T>(
        &self,
        method: &'static str,
        sheet: &SheetRef,
        f: impl FnOnce(&mut Grid) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.lock().map_err(|_| anyhow!("state poisoned"))?;
        *state.calls.entry(method).or_default() += 1;
        if state.failing.remove(method) {
            bail!("{} failed (injected)", method);
        }
        let grid = state
            .sheets
            .get_mut(&key(sheet))
            .ok_or_else(|| anyhow!("WorksheetNotFound: {}", sheet))?;
        f(grid)
    }
}

#[async_trait]
impl SheetsBackend for MemorySheets {
    async fn properties(&self, sheet: &SheetRef) -> Result<SheetProperties> {
        self.with_grid("properties", sheet, |g| {
            Ok(SheetProperties {
                sheet_id: g.sheet_id,
                row_count: g.rows.len() as u32,
                column_count: g.rows.iter().map(Vec::len).max().unwrap_or(0) as u32,
            })
        })
    }

    async fn row_values(&self, sheet: &SheetRef, row: u32, _render: ValueRender) -> Result<Vec<CellValue>> {
        self.with_grid("row_values", sheet, |g| {
            let cells = g.rows.get(row as usize - 1).cloned().unwrap_or_default();
            Ok(trim_trailing(cells))
        })
    }

    async fn col_values(&self, sheet: &SheetRef, col: u32) -> Result<Vec<String>> {
        self.with_grid("col_values", sheet, |g| {
            let mut values: Vec<String> = g
                .rows
                .iter()
                .map(|r| r.get(col as usize - 1).map(|c| c.to_string()).unwrap_or_default())
                .collect();
            while values.last().is_some_and(|v| v.is_empty()) {
                values.pop();
            }
            Ok(values)
        })
    }

    async fn all_values(&self, sheet: &SheetRef) -> Result<Vec<Vec<String>>> {
        self.with_grid("all_values", sheet, |g| {
            Ok(g.rows
                .iter()
                .map(|r| trim_trailing(r.clone()).iter().map(|c| c.to_string()).collect())
                .collect())
        })
    }

    async fn append_rows(&self, sheet: &SheetRef, rows: &[Vec<CellValue>]) -> Result<()> {
        self.with_grid("append_rows", sheet, |g| {
            g.rows.extend(rows.iter().cloned());
            g.formats.extend(rows.iter().map(|_| None));
            Ok(())
        })
    }

    async fn copy_format(&self, sheet: &SheetRef, source_row: u32, target: RowSpan) -> Result<()> {
        self.with_grid("copy_format", sheet, |g| {
            let tag = g
                .formats
                .get(source_row as usize - 1)
                .cloned()
                .ok_or_else(|| anyhow!("row {} out of range", source_row))?;
            for row in target.first..=target.last {
                let slot = g
                    .formats
                    .get_mut(row as usize - 1)
                    .ok_or_else(|| anyhow!("row {} out of range", row))?;
                *slot = tag.clone();
            }
            Ok(())
        })
    }

    async fn delete_rows(&self, sheet: &SheetRef, rows: &[u32]) -> Result<()> {
        self.with_grid("delete_rows", sheet, |g| {
            let mut sorted = rows.to_vec();
            sorted.sort_unstable_by(|a, b| b.cmp(a));
            sorted.dedup();
            for row in sorted {
                let idx = row as usize - 1;
                if idx < g.rows.len() {
                    g.rows.remove(idx);
                    g.formats.remove(idx);
                }
            }
            Ok(())
        })
    }

    async fn update_cells(&self, sheet: &SheetRef, updates: &[CellUpdate]) -> Result<()> {
        self.with_grid("update_cells", sheet, |g| {
            for update in updates {
                let row = g
                    .rows
                    .get_mut(update.row as usize - 1)
                    .ok_or_else(|| anyhow!("row {} out of range", update.row))?;
                let col = update.col as usize - 1;
                if row.len() <= col {
                    row.resize(col + 1, CellValue::Empty);
                }
                row[col] = update.value.clone();
            }
            Ok(())
        })
    }
}
