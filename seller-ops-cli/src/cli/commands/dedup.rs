use anyhow::{Context, Result, anyhow};
use colored::*;

use crate::config::Config;
use crate::sheets::dedup::remove_duplicates_from_col;
use crate::sheets::{SheetsBackend, read_header};

/// Remove repeated comparison-column values from one profile's sheet
pub async fn handle_dedup(config: &Config, backend: &dyn SheetsBackend, profile_name: &str) -> Result<()> {
    let removed = dedup_profile(config, backend, profile_name).await?;
    if removed == 0 {
        println!("{} {}", "✓".green(), "no duplicates".dimmed());
    } else {
        println!("{} removed {} duplicate row(s)", "✓".green(), removed);
    }
    Ok(())
}

pub async fn dedup_profile(config: &Config, backend: &dyn SheetsBackend, profile_name: &str) -> Result<usize> {
    let profile = config
        .profile(profile_name)
        .ok_or_else(|| anyhow!("Unknown profile '{}'", profile_name))?;
    let sheet = config.profile_ref(profile)?;
    let trash = config.trash_ref()?;

    let header = read_header(backend, &sheet, profile.header_row).await?;
    let col = header.position(&profile.comparison_column)?;
    let values = backend
        .col_values(&sheet, col)
        .await
        .with_context(|| format!("Failed to read column '{}' of {}", profile.comparison_column, sheet))?;

    remove_duplicates_from_col(backend, &sheet, &values, profile.header_row, trash.as_ref()).await
}
