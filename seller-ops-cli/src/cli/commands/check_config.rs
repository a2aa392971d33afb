//! check-config: validate the config against the live sheets, read-only

use anyhow::{Result, bail};
use colored::*;

use crate::config::{Config, SheetProfile};
use crate::sheets::{SheetsBackend, load_template, read_header};

/// Result of checking one sheet
#[derive(Debug)]
pub struct Check {
    pub name: String,
    pub result: Result<String>,
}

pub async fn handle_check_config(config: &Config, backend: &dyn SheetsBackend) -> Result<()> {
    let checks = run_checks(config, backend).await;

    let mut failed = 0;
    for check in &checks {
        match &check.result {
            Ok(detail) => println!("  {} {} {}", "✓".green(), check.name.bright_white(), detail.dimmed()),
            Err(e) => {
                failed += 1;
                println!("  {} {} {}", "✗".red(), check.name.bright_white(), format!("{:#}", e).red());
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} check(s) failed", failed, checks.len());
    }
    println!("{}", "Config matches the live sheets".green());
    Ok(())
}

pub async fn run_checks(config: &Config, backend: &dyn SheetsBackend) -> Vec<Check> {
    let mut checks = vec![Check {
        name: "staging".to_string(),
        result: check_staging(config, backend).await,
    }];

    for profile in &config.profiles {
        checks.push(Check {
            name: profile.name.clone(),
            result: check_profile(config, backend, profile).await,
        });
    }

    if let Some(delete) = &config.delete {
        for target in &delete.targets {
            let result = async {
                let sheet = config.sheet_ref(&target.spreadsheet, &target.sheet)?;
                let header = read_header(backend, &sheet, target.header_row).await?;
                let col = header.position(&target.column)?;
                Ok::<_, anyhow::Error>(format!("'{}' is column {}", target.column, col))
            }
            .await;
            checks.push(Check {
                name: format!("delete: {}", target.sheet),
                result,
            });
        }
    }
    checks
}

async fn check_staging(config: &Config, backend: &dyn SheetsBackend) -> Result<String> {
    let staging = &config.staging;
    let sheet = config.staging_ref()?;
    let header = read_header(backend, &sheet, staging.header_row).await?;
    header.index(&staging.columns.sku)?;
    header.index(&staging.columns.status)?;
    Ok(format!("{} header columns", header.width()))
}

async fn check_profile(config: &Config, backend: &dyn SheetsBackend, profile: &SheetProfile) -> Result<String> {
    let sheet = config.profile_ref(profile)?;
    let header = read_header(backend, &sheet, profile.header_row).await?;
    let targets = profile.targets()?.resolve(&header)?;
    header.position(&profile.comparison_column)?;

    if !profile.formula_columns.is_empty() {
        let template = load_template(backend, &sheet, &header).await?;
        template.validate_formula_columns(&sheet.title, &header, &profile.formula_columns)?;
    }
    Ok(format!("targets {:?}", targets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::memory::MemorySheets;

    const CONFIG: &str = r#"
        [spreadsheets.unit]
        id = "mem-UNIT"
        title = "UNIT"

        [staging]
        spreadsheet = "unit"
        sheet = "Для юнит"

        [[profile]]
        name = "sopost"
        spreadsheet = "unit"
        sheet = "Сопост"
        comparison_column = "wild"
        key_field = "supplier_code_unique"
        formula_columns = ["Маржа"]
        bindings = [{ column = "wild", field = "supplier_code_unique" }]

        [[profile]]
        name = "promo"
        spreadsheet = "unit"
        sheet = "Акции"
        header_row = 3
        comparison_column = "Артикул"
        key_field = "sku"
        bindings = [{ column = "Артикул", field = "sku" }]
    "#;

    #[tokio::test]
    async fn test_reports_each_sheet_without_writing() {
        let config = Config::from_toml(CONFIG).unwrap();
        let backend = MemorySheets::new();
        backend.add_sheet("UNIT", "Для юнит", vec![vec!["Артикул", "Статус"]]);
        backend.add_sheet("UNIT", "Сопост", vec![vec!["wild", "Маржа"], vec!["wild1", "=A2"]]);
        backend.add_sheet("UNIT", "Акции", vec![vec!["x"], vec![""], vec!["SKU"]]);

        let checks = run_checks(&config, &backend).await;

        assert_eq!(checks.len(), 3);
        assert!(checks[0].result.is_ok());
        assert_eq!(checks[1].result.as_ref().unwrap(), "targets [0]");
        assert!(checks[2].result.is_err());
        assert_eq!(backend.calls("append_rows"), 0);
        assert_eq!(backend.calls("update_cells"), 0);
    }

    #[tokio::test]
    async fn test_missing_formula_is_reported() {
        let config = Config::from_toml(CONFIG).unwrap();
        let backend = MemorySheets::new();
        backend.add_sheet("UNIT", "Сопост", vec![vec!["wild", "Маржа"], vec!["wild1", "5"]]);

        let checks = run_checks(&config, &backend).await;
        let err = checks[1].result.as_ref().unwrap_err();
        assert!(crate::error::is_schema_drift(err));
    }
}
