//! add-items command handler

use anyhow::{Context, Result, bail};
use colored::*;
use log::info;
use regex::Regex;

use crate::api::{CatalogClient, MarketplaceClient, ResilienceConfig, RetryPolicy, TokenStore, http_client};
use crate::config::{CatalogConfig, Config, secret};
use crate::pipeline::{CatalogBranch, NewItemPipeline, RunReport};
use crate::sheets::SheetsBackend;

/// Live catalog collaborators, owned for the length of one run
struct CatalogCollaborators {
    catalog: CatalogClient,
    lookup: MarketplaceClient,
    duplicate_pattern: Regex,
}

impl CatalogCollaborators {
    fn connect(settings: &CatalogConfig, resilience: &ResilienceConfig) -> Result<Self> {
        let http = http_client(resilience)?;
        let database_url = secret(&settings.database_url_env)?;
        let tokens = TokenStore::load(&settings.tokens_file)?;
        info!("Loaded marketplace tokens for {} client(s)", tokens.len());

        Ok(Self {
            catalog: CatalogClient::new(&database_url, &settings.base_url, http.clone())?,
            lookup: MarketplaceClient::new(
                http,
                &settings.marketplace_url,
                tokens,
                RetryPolicy::new(resilience.retry.clone()),
            ),
            duplicate_pattern: Regex::new(&settings.duplicate_pattern)
                .with_context(|| format!("Invalid duplicate_pattern '{}'", settings.duplicate_pattern))?,
        })
    }

    fn branch(&self) -> CatalogBranch<'_> {
        CatalogBranch {
            catalog: &self.catalog,
            lookup: &self.lookup,
            duplicate_pattern: self.duplicate_pattern.clone(),
        }
    }
}

pub async fn handle_add_items(config: &Config, backend: &dyn SheetsBackend, dry_run: bool) -> Result<()> {
    let resilience = config.retry.resilience();
    let collaborators = match &config.catalog {
        Some(settings) if settings.enabled => Some(CatalogCollaborators::connect(settings, &resilience)?),
        _ => None,
    };

    let mut pipeline = NewItemPipeline::new(backend, config);
    if let Some(collaborators) = &collaborators {
        pipeline = pipeline.with_catalog(collaborators.branch());
    }

    let report = pipeline.run(dry_run).await?;
    report.log_summary();
    if let Some(path) = &config.run.report_path {
        report.write_json(path)?;
        info!("Run report written to {}", path.display());
    }
    print_report(&report);

    if report.has_failures() {
        bail!("Run {} finished with failures", report.run_id);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let title = if report.dry_run { "Dry run" } else { "Run" };
    println!("{} {}", title.bold(), report.run_id.to_string().dimmed());

    for sheet in &report.sheets {
        match (&sheet.outcome, &sheet.error) {
            (Some(o), _) => {
                let added = if report.dry_run { o.planned } else { o.inserted };
                println!(
                    "  {} {} {}",
                    "✓".green(),
                    sheet.profile.bright_white(),
                    format!("+{} row(s), {} skipped", added, o.skipped.len()).dimmed()
                );
            }
            (None, Some(e)) => println!("  {} {} {}", "✗".red(), sheet.profile.bright_white(), e.red()),
            (None, None) => {}
        }
    }

    if let Some(reg) = &report.registration {
        let count = if report.dry_run { reg.planned.len() } else { reg.registered.len() };
        println!("  {} products: +{}", "✓".green(), count);
        for failed in &reg.failed {
            println!("  {} {}: {}", "✗".red(), failed.code, failed.reason.red());
        }
        for code in &reg.duplicates {
            println!("  {} {}: {}", "✗".red(), code, "duplicate marker, not registered".red());
        }
    }
    if let Some(e) = &report.mark_done_error {
        println!("  {} staging statuses: {}", "✗".red(), e.red());
    }
    if let Some(reason) = &report.aborted {
        println!("{} {}", "Aborted:".red().bold(), reason);
    }
}
