//! Run report: which sheets were updated and which were not

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

use crate::sheets::SyncOutcome;

use super::registration::RegistrationOutcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetReport {
    pub profile: String,
    pub sheet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SyncOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SheetReport {
    pub fn ok(profile: &str, sheet: &str, outcome: SyncOutcome) -> Self {
        Self {
            profile: profile.to_string(),
            sheet: sheet.to_string(),
            outcome: Some(outcome),
            error: None,
        }
    }

    pub fn failed(profile: &str, sheet: &str, err: &anyhow::Error) -> Self {
        Self {
            profile: profile.to_string(),
            sheet: sheet.to_string(),
            outcome: None,
            error: Some(format!("{:#}", err)),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub job: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sheets: Vec<SheetReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration: Option<RegistrationOutcome>,
    /// Set when the catalog branch itself could not run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_error: Option<String>,
    /// Staging rows whose status was written back
    pub marked_done: usize,
    /// Set when writing the staging statuses back failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark_done_error: Option<String>,
    /// Set when the run stopped before every sheet was attempted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn start(job: &str, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            job: job.to_string(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            sheets: Vec::new(),
            registration: None,
            registration_error: None,
            marked_done: 0,
            mark_done_error: None,
            aborted: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn failed_sheets(&self) -> impl Iterator<Item = &SheetReport> {
        self.sheets.iter().filter(|s| !s.is_ok())
    }

    pub fn has_failures(&self) -> bool {
        self.aborted.is_some()
            || self.registration_error.is_some()
            || self.mark_done_error.is_some()
            || self.failed_sheets().next().is_some()
            || self.registration.as_ref().is_some_and(|r| r.has_failures())
    }

    pub fn log_summary(&self) {
        info!("Run {} ({}) summary:", self.run_id, self.job);
        for sheet in &self.sheets {
            match (&sheet.outcome, &sheet.error) {
                (Some(o), _) if self.dry_run => info!(
                    "  {} [{}]: would add {}, {} already present, {} duplicate(s)",
                    sheet.profile,
                    sheet.sheet,
                    o.planned,
                    o.skipped.len(),
                    o.removed_duplicates
                ),
                (Some(o), _) => info!(
                    "  {} [{}]: added {}, {} already present, removed {} duplicate(s)",
                    sheet.profile,
                    sheet.sheet,
                    o.inserted,
                    o.skipped.len(),
                    o.removed_duplicates
                ),
                (None, Some(e)) => error!("  {} [{}]: FAILED: {}", sheet.profile, sheet.sheet, e),
                (None, None) => {}
            }
        }

        if let Some(reg) = &self.registration {
            info!(
                "  products: registered {}, {} already present, {} planned",
                reg.registered.len(),
                reg.already_present,
                reg.planned.len()
            );
            if !reg.failed.is_empty() {
                warn!("  products: {} code(s) failed: {:?}", reg.failed.len(), reg.failed);
            }
        }
        if let Some(e) = &self.registration_error {
            error!("  products: branch failed: {}", e);
        }
        if let Some(reason) = &self.aborted {
            error!("  run aborted: {}", reason);
        }
        if self.marked_done > 0 {
            info!("  marked {} staging row(s) done", self.marked_done);
        }
        if let Some(e) = &self.mark_done_error {
            error!("  staging statuses not updated: {}", e);
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create report directory: {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run report: {}", path.display()))?;
        Ok(())
    }
}
