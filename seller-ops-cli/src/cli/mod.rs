//! Command-line interface

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::pipeline::{ADD_ITEMS_JOB, DELETE_ITEMS_JOB};

#[derive(Parser, Debug)]
#[command(name = "seller-ops")]
#[command(version, about = "Keep the seller operations spreadsheets in sync with the staging sheet", long_about = None)]
pub struct Cli {
    /// Config file (defaults to $SELLER_OPS_CONFIG, then the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Add the staged new items to every downstream sheet and the product catalog
    AddItems {
        /// Reconcile and report without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove the SKUs flagged for deletion from the target sheets
    DeleteItems {
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove duplicate rows from one profile's sheet
    Dedup {
        /// Profile name from the config
        #[arg(long)]
        sheet: String,
    },

    /// Check every profile against the live header rows, writing nothing
    CheckConfig,
}

impl Commands {
    /// Log file name for the command
    pub fn job_name(&self) -> &'static str {
        match self {
            Commands::AddItems { .. } => ADD_ITEMS_JOB,
            Commands::DeleteItems { .. } => DELETE_ITEMS_JOB,
            Commands::Dedup { .. } => "dedup",
            Commands::CheckConfig => "check_config",
        }
    }
}
