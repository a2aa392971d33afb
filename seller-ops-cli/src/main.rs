mod api;
mod cli;
mod config;
mod error;
mod logging;
mod pipeline;
mod sheets;

use anyhow::Result;
use clap::Parser;
use colored::*;
use log::{error, info};

use crate::api::GoogleSheetsClient;
use crate::cli::Cli;
use crate::config::{Config, secret};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{:#}", e);
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let path = config::resolve_path(cli.config.as_deref())?;
    let config = Config::load(&path)?;

    let log_file = logging::init(&config.logging, cli.command.job_name())?;
    info!("Config loaded from {}, logging to {}", path.display(), log_file.display());

    let resilience = config.retry.resilience();
    let mut sheets = GoogleSheetsClient::new(secret(&config.auth.token_env)?, &resilience)?;
    if let Some(url) = &config.auth.sheets_api_url {
        sheets = sheets.with_base_url(url);
    }

    cli::commands::dispatch(&cli.command, &config, &sheets).await
}
