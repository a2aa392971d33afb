//! Delete-items job: drop the SKUs flagged for deletion from every target sheet

use anyhow::{Context, Result};
use log::{error, info};
use std::collections::HashSet;

use crate::config::{Config, DeleteConfig};
use crate::sheets::dedup::{data_rows, delete_rows_by_values};
use crate::sheets::{SheetRef, SheetsBackend, read_header};

#[derive(Debug, Clone, PartialEq)]
pub struct TargetOutcome {
    pub sheet: String,
    pub removed: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteOutcome {
    pub skus: Vec<String>,
    pub targets: Vec<TargetOutcome>,
}

impl DeleteOutcome {
    pub fn has_failures(&self) -> bool {
        self.targets.iter().any(|t| t.error.is_some())
    }

    pub fn removed(&self) -> usize {
        self.targets.iter().map(|t| t.removed).sum()
    }
}

/// SKUs of the rows flagged with `delete_status`, in sheet order
pub async fn read_flagged_skus(
    backend: &dyn SheetsBackend,
    sheet: &SheetRef,
    settings: &DeleteConfig,
) -> Result<Vec<String>> {
    let header = read_header(backend, sheet, settings.header_row).await?;
    let sku_idx = header.index(&settings.sku_column)?;
    let status_idx = header.index(&settings.status_column)?;

    let rows = backend
        .all_values(sheet)
        .await
        .with_context(|| format!("Failed to read {}", sheet))?;

    let mut seen = HashSet::new();
    let skus = rows
        .iter()
        .skip(settings.header_row as usize)
        .filter(|row| row.get(status_idx).map(|s| s.trim()) == Some(settings.delete_status.as_str()))
        .filter_map(|row| row.get(sku_idx).map(|s| s.trim().to_string()))
        .filter(|sku| !sku.is_empty() && seen.insert(sku.clone()))
        .collect();
    Ok(skus)
}

pub struct DeleteItemsJob<'a> {
    backend: &'a dyn SheetsBackend,
    config: &'a Config,
}

impl<'a> DeleteItemsJob<'a> {
    pub fn new(backend: &'a dyn SheetsBackend, config: &'a Config) -> Self {
        Self { backend, config }
    }

    /// Read the flagged SKUs, then clean each target in turn. A failing
    /// target is logged and the next one is still attempted.
    pub async fn run(&self, dry_run: bool) -> Result<DeleteOutcome> {
        let settings = self
            .config
            .delete
            .as_ref()
            .context("No [delete] section in the config")?;
        let source = self.config.sheet_ref(&self.config.staging.spreadsheet, &settings.sheet)?;

        let skus = read_flagged_skus(self.backend, &source, settings).await?;
        info!("Found {} SKU(s) to delete: {:?}", skus.len(), skus);

        let mut outcome = DeleteOutcome {
            skus,
            targets: Vec::new(),
        };
        if outcome.skus.is_empty() {
            return Ok(outcome);
        }
        let values: HashSet<String> = outcome.skus.iter().cloned().collect();

        for target in &settings.targets {
            let result = match self.config.sheet_ref(&target.spreadsheet, &target.sheet) {
                Ok(sheet) => {
                    self.clean_target(&sheet, &target.column, target.header_row, &values, dry_run)
                        .await
                }
                Err(e) => Err(e),
            };

            outcome.targets.push(match result {
                Ok(removed) => TargetOutcome {
                    sheet: target.sheet.clone(),
                    removed,
                    error: None,
                },
                Err(e) => {
                    error!("Error deleting items from '{}': {:#}", target.sheet, e);
                    TargetOutcome {
                        sheet: target.sheet.clone(),
                        removed: 0,
                        error: Some(format!("{:#}", e)),
                    }
                }
            });
        }
        Ok(outcome)
    }

    async fn clean_target(
        &self,
        sheet: &SheetRef,
        column: &str,
        header_row: u32,
        values: &HashSet<String>,
        dry_run: bool,
    ) -> Result<usize> {
        let header = read_header(self.backend, sheet, header_row).await?;
        let col = header.position(column)?;
        let col_values = self
            .backend
            .col_values(sheet, col)
            .await
            .with_context(|| format!("Failed to read column '{}' of {}", column, sheet))?;

        if dry_run {
            let count = data_rows(&col_values, header_row)
                .iter()
                .filter(|v| values.contains(v.trim()))
                .count();
            info!("[dry run] would delete {} row(s) from {}", count, sheet);
            return Ok(count);
        }
        delete_rows_by_values(self.backend, sheet, &col_values, header_row, values, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::memory::MemorySheets;

    fn config() -> Config {
        Config::from_toml(
            r#"
            [spreadsheets.new_items]
            id = "mem-Новый товар"
            title = "Новый товар"

            [spreadsheets.unit]
            id = "mem-UNIT"
            title = "UNIT"

            [staging]
            spreadsheet = "new_items"

            [delete]

            [[delete.target]]
            spreadsheet = "unit"
            sheet = "MAIN (tested)"

            [[delete.target]]
            spreadsheet = "unit"
            sheet = "Missing tab"

            [[delete.target]]
            spreadsheet = "new_items"
            sheet = "Для юнит"
            "#,
        )
        .unwrap()
    }

    fn seed(backend: &MemorySheets) {
        backend.add_sheet(
            "Новый товар",
            "На удаление",
            vec![
                vec!["Артикул", "Клиент", "Статус"],
                vec!["111", "ИП", "Удалить"],
                vec!["222", "ИП", "Оставить"],
                vec!["333", "ИП", "Удалить"],
            ],
        );
        backend.add_sheet(
            "UNIT",
            "MAIN (tested)",
            vec![
                vec!["Артикул", "wild"],
                vec!["111", "wild1"],
                vec!["222", "wild2"],
                vec!["333", "wild3"],
            ],
        );
        backend.add_sheet(
            "Новый товар",
            "Для юнит",
            vec![vec!["Поставщик", "Артикул"], vec!["Ф", "333"]],
        );
    }

    #[tokio::test]
    async fn test_deletes_flagged_skus_and_continues_past_failures() {
        let backend = MemorySheets::new();
        seed(&backend);
        let config = config();

        let outcome = DeleteItemsJob::new(&backend, &config).run(false).await.unwrap();

        assert_eq!(outcome.skus, vec!["111", "333"]);
        assert_eq!(outcome.targets.len(), 3);
        assert_eq!(outcome.targets[0].removed, 2);
        assert!(outcome.targets[1].error.is_some());
        assert_eq!(outcome.targets[2].removed, 1);
        assert!(outcome.has_failures());
        assert_eq!(outcome.removed(), 3);

        let main = config.sheet_ref("unit", "MAIN (tested)").unwrap();
        assert_eq!(backend.values(&main), vec![vec!["Артикул", "wild"], vec!["222", "wild2"]]);
        assert_eq!(backend.calls("delete_rows"), 2);
    }

    #[tokio::test]
    async fn test_dry_run_only_counts() {
        let backend = MemorySheets::new();
        seed(&backend);
        let config = config();

        let outcome = DeleteItemsJob::new(&backend, &config).run(true).await.unwrap();

        assert_eq!(outcome.targets[0].removed, 2);
        assert_eq!(backend.calls("delete_rows"), 0);
    }

    #[tokio::test]
    async fn test_nothing_flagged() {
        let backend = MemorySheets::new();
        backend.add_sheet("Новый товар", "На удаление", vec![vec!["Артикул", "Статус"], vec!["1", "ок"]]);
        let config = config();

        let outcome = DeleteItemsJob::new(&backend, &config).run(false).await.unwrap();
        assert!(outcome.skus.is_empty());
        assert!(outcome.targets.is_empty());
    }
}
