use anyhow::{Result, bail};
use colored::*;

use crate::config::Config;
use crate::pipeline::DeleteItemsJob;
use crate::sheets::SheetsBackend;

pub async fn handle_delete_items(config: &Config, backend: &dyn SheetsBackend, dry_run: bool) -> Result<()> {
    let outcome = DeleteItemsJob::new(backend, config).run(dry_run).await?;

    if outcome.skus.is_empty() {
        println!("{}", "Nothing flagged for deletion".dimmed());
        return Ok(());
    }

    let verb = if dry_run { "would remove" } else { "removed" };
    println!("{} SKU(s) flagged: {}", outcome.skus.len(), outcome.skus.join(", ").bright_white());
    for target in &outcome.targets {
        match &target.error {
            None => println!("  {} {} {} {} row(s)", "✓".green(), target.sheet, verb, target.removed),
            Some(e) => println!("  {} {} {}", "✗".red(), target.sheet, e.red()),
        }
    }

    if outcome.has_failures() {
        bail!("Some target sheets could not be cleaned");
    }
    Ok(())
}
