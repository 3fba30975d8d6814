//! Append-only activity log, one JSON record per line.
//!
//! Logging is fire-and-forget: a failed write is reported through `tracing`
//! and otherwise swallowed, so audit problems can never influence the
//! control flow of the workflow itself.

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::ActivityRecord;
use crate::workflow::context::TddPhase;

#[derive(Clone)]
pub struct ActivityLogger {
    log_file: PathBuf,
}

impl ActivityLogger {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            log_file: project_dir.join(crate::META_DIR).join("activity.jsonl"),
        }
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Record a phase boundary crossing.
    pub fn log_phase_transition(
        &self,
        subtask_id: &str,
        from: &str,
        to: &str,
        metadata: BTreeMap<String, String>,
    ) {
        self.append(ActivityRecord::PhaseTransition {
            timestamp: Utc::now(),
            subtask_id: subtask_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            metadata,
        });
    }

    /// Record the outcome of a phase attempt.
    pub fn log_phase_result(
        &self,
        subtask_id: &str,
        phase: TddPhase,
        success: bool,
        metadata: BTreeMap<String, String>,
    ) {
        self.append(ActivityRecord::PhaseResult {
            timestamp: Utc::now(),
            subtask_id: subtask_id.to_string(),
            phase,
            success,
            metadata,
        });
    }

    fn append(&self, record: ActivityRecord) {
        if let Err(err) = self.try_append(&record) {
            tracing::warn!("Failed to write activity record: {err:#}");
        }
    }

    fn try_append(&self, record: &ActivityRecord) -> Result<()> {
        if let Some(parent) = self.log_file.parent() {
            fs::create_dir_all(parent).context("Failed to create activity log directory")?;
        }

        let line = serde_json::to_string(record).context("Failed to serialize activity record")?;

        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .context("Failed to open activity log")?
            .write_all(format!("{line}\n").as_bytes())
            .context("Failed to write activity record")?;

        Ok(())
    }

    /// Parse the log back into records, skipping lines that fail to parse.
    /// Used by callers that display history; the orchestrator never calls
    /// this.
    pub fn read_records(&self) -> Result<Vec<ActivityRecord>> {
        if !self.log_file.exists() {
            return Ok(Vec::new());
        }

        let content =
            fs::read_to_string(&self.log_file).context("Failed to read activity log")?;

        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}
