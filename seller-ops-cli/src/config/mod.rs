//! Job configuration
//!
//! Loaded once from a TOML file and passed to every component. Secrets are
//! never stored in the file: it only names the environment variables (filled
//! from `.env` by dotenvy) that carry them.

pub mod profile;

pub use profile::{Binding, Case, Constant, SheetProfile, SpanBinding, ValueSpec};

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::{ResilienceConfig, RetryConfig};
use crate::pipeline::card::CardColumns;
use crate::sheets::SheetRef;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "SELLER_OPS_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    /// Spreadsheets by alias
    pub spreadsheets: BTreeMap<String, SpreadsheetConfig>,
    pub staging: StagingConfig,
    /// Downstream sheets, synced in this order
    #[serde(default, rename = "profile")]
    pub profiles: Vec<SheetProfile>,
    #[serde(default)]
    pub catalog: Option<CatalogConfig>,
    #[serde(default)]
    pub delete: Option<DeleteConfig>,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Variable holding the spreadsheet API bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default)]
    pub sheets_api_url: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            sheets_api_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpreadsheetConfig {
    /// Key from the spreadsheet URL
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StagingConfig {
    pub spreadsheet: String,
    #[serde(default = "default_staging_sheet")]
    pub sheet: String,
    #[serde(default = "default_header_row")]
    pub header_row: u32,
    #[serde(default = "default_ready_status")]
    pub ready_status: String,
    /// Archive tab in the staging spreadsheet for removed rows
    #[serde(default)]
    pub trash_sheet: Option<String>,
    /// Status written back to staged rows after a clean run; unset keeps them as they are
    #[serde(default)]
    pub mark_done_status: Option<String>,
    #[serde(default)]
    pub columns: CardColumns,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Variable holding the operations database URL
    #[serde(default = "default_database_url_env")]
    pub database_url_env: String,
    /// Goods-information service root
    pub base_url: String,
    #[serde(default = "default_marketplace_url")]
    pub marketplace_url: String,
    /// JSON map of client name to marketplace token
    pub tokens_file: PathBuf,
    /// Codes matching this are duplicates and never registered
    #[serde(default = "default_duplicate_pattern")]
    pub duplicate_pattern: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteConfig {
    #[serde(default = "default_delete_sheet")]
    pub sheet: String,
    #[serde(default = "default_header_row")]
    pub header_row: u32,
    #[serde(default = "default_sku_column")]
    pub sku_column: String,
    #[serde(default = "default_status_column")]
    pub status_column: String,
    #[serde(default = "default_delete_status")]
    pub delete_status: String,
    #[serde(default, rename = "target")]
    pub targets: Vec<DeleteTarget>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteTarget {
    pub spreadsheet: String,
    pub sheet: String,
    #[serde(default = "default_sku_column")]
    pub column: String,
    #[serde(default = "default_header_row")]
    pub header_row: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Keep going after a write failure on one sheet
    #[serde(default)]
    pub continue_on_sheet_error: bool,
    /// Write the run report here as JSON
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_true")]
    pub jitter: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl RetrySettings {
    pub fn resilience(&self) -> ResilienceConfig {
        ResilienceConfig::builder()
            .retry_config(RetryConfig {
                max_attempts: self.max_attempts.max(1),
                base_delay: Duration::from_millis(self.base_delay_ms),
                max_delay: Duration::from_millis(self.max_delay_ms),
                backoff_multiplier: self.backoff_multiplier,
                jitter: self.jitter,
            })
            .request_timeout(Duration::from_secs(self.request_timeout_secs))
            .build()
    }
}

fn default_token_env() -> String {
    "GOOGLE_SHEETS_TOKEN".to_string()
}
fn default_staging_sheet() -> String {
    "Для юнит".to_string()
}
fn default_header_row() -> u32 {
    1
}
fn default_ready_status() -> String {
    "добавить".to_string()
}
fn default_true() -> bool {
    true
}
fn default_database_url_env() -> String {
    "PRODUCTS_DATABASE_URL".to_string()
}
fn default_marketplace_url() -> String {
    "https://content-api.wildberries.ru".to_string()
}
fn default_duplicate_pattern() -> String {
    r"^wild\d+d\d*$".to_string()
}
fn default_delete_sheet() -> String {
    "На удаление".to_string()
}
fn default_sku_column() -> String {
    "Артикул".to_string()
}
fn default_status_column() -> String {
    "Статус".to_string()
}
fn default_delete_status() -> String {
    "Удалить".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_request_timeout_secs() -> u64 {
    60
}

/// Config file location: explicit path, then `$SELLER_OPS_CONFIG`, then the
/// user config directory
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("seller-ops").join("config.toml"))
        .ok_or_else(|| anyhow!("No config directory found; pass --config or set {}", CONFIG_ENV))
}

/// Read a secret from the environment
pub fn secret(var: &str) -> Result<String> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("Environment variable {} is not set", var))
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Static consistency checks; live header checks happen in `check-config`
    pub fn validate(&self) -> Result<()> {
        self.spreadsheet(&self.staging.spreadsheet)?;

        let mut names = HashSet::new();
        for profile in &self.profiles {
            if !names.insert(profile.name.as_str()) {
                bail!("Duplicate profile name '{}'", profile.name);
            }
            self.spreadsheet(&profile.spreadsheet)
                .with_context(|| format!("profile '{}'", profile.name))?;
            profile.validate()?;
        }

        if let Some(catalog) = &self.catalog {
            regex::Regex::new(&catalog.duplicate_pattern)
                .with_context(|| format!("Invalid duplicate_pattern '{}'", catalog.duplicate_pattern))?;
        }

        if let Some(delete) = &self.delete {
            for target in &delete.targets {
                self.spreadsheet(&target.spreadsheet)
                    .with_context(|| format!("delete target '{}'", target.sheet))?;
            }
        }
        Ok(())
    }

    pub fn spreadsheet(&self, alias: &str) -> Result<&SpreadsheetConfig> {
        self.spreadsheets
            .get(alias)
            .ok_or_else(|| anyhow!("Unknown spreadsheet alias '{}'", alias))
    }

    pub fn sheet_ref(&self, alias: &str, title: &str) -> Result<SheetRef> {
        let spreadsheet = self.spreadsheet(alias)?;
        Ok(SheetRef::new(&spreadsheet.id, &spreadsheet.title, title))
    }

    pub fn staging_ref(&self) -> Result<SheetRef> {
        self.sheet_ref(&self.staging.spreadsheet, &self.staging.sheet)
    }

    pub fn trash_ref(&self) -> Result<Option<SheetRef>> {
        self.staging
            .trash_sheet
            .as_deref()
            .map(|title| self.sheet_ref(&self.staging.spreadsheet, title))
            .transpose()
    }

    pub fn profile_ref(&self, profile: &SheetProfile) -> Result<SheetRef> {
        self.sheet_ref(&profile.spreadsheet, &profile.sheet)
    }

    pub fn profile(&self, name: &str) -> Option<&SheetProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }
}
