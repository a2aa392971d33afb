//! Command handlers

pub mod add_items;
pub mod check_config;
pub mod dedup;
pub mod delete_items;

use anyhow::Result;

use super::Commands;
use crate::config::Config;
use crate::sheets::SheetsBackend;

pub async fn dispatch(command: &Commands, config: &Config, backend: &dyn SheetsBackend) -> Result<()> {
    match command {
        Commands::AddItems { dry_run } => add_items::handle_add_items(config, backend, *dry_run).await,
        Commands::DeleteItems { dry_run } => delete_items::handle_delete_items(config, backend, *dry_run).await,
        Commands::Dedup { sheet } => dedup::handle_dedup(config, backend, sheet).await,
        Commands::CheckConfig => check_config::handle_check_config(config, backend).await,
    }
}
