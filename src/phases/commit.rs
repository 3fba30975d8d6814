//! COMMIT phase: record the green state in version control.
//!
//! Composes a commit message, stages the changed files, and creates the
//! commit. An empty changed-file list is a structured, retryable failure;
//! adapter errors propagate untouched.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;

use crate::audit::ActivityLogger;
use crate::git::GitAdapter;
use crate::subtask::SubtaskInfo;
use crate::workflow::context::{TddPhase, TestResult};

/// Input to commit-message composition, carrying enough context for
/// traceability (task id, subtask, files, test counts).
#[derive(Debug, Clone)]
pub struct CommitMessageRequest {
    /// Conventional-commit type (e.g., "feat", "fix")
    pub change_type: String,
    pub description: String,
    pub changed_files: Vec<PathBuf>,
    pub task_id: String,
    pub subtask_id: String,
    pub tests_passing: u32,
    pub tests_failing: u32,
}

#[async_trait]
pub trait MessageComposer: Send + Sync {
    async fn generate_message(&self, request: &CommitMessageRequest) -> Result<String>;
}

/// Default composer producing a conventional-commit subject with a
/// traceability body.
pub struct ConventionalComposer;

#[async_trait]
impl MessageComposer for ConventionalComposer {
    async fn generate_message(&self, request: &CommitMessageRequest) -> Result<String> {
        let files: Vec<String> = request
            .changed_files
            .iter()
            .map(|p| p.display().to_string())
            .collect();

        Ok(format!(
            "{}(task-{}): {}\n\nSubtask: {}\nFiles: {}\nTests: {} passing, {} failing",
            request.change_type,
            request.task_id,
            request.description,
            request.subtask_id,
            files.join(", "),
            request.tests_passing,
            request.tests_failing,
        ))
    }
}

/// Outcome of one COMMIT phase attempt.
#[derive(Debug, Clone)]
pub struct CommitPhaseResult {
    pub success: bool,
    pub phase: TddPhase,
    pub commit_hash: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Stages and commits the changed files for one subtask.
pub struct CommitPhaseOrchestrator {
    git: Arc<dyn GitAdapter>,
    composer: Arc<dyn MessageComposer>,
    logger: ActivityLogger,
}

impl CommitPhaseOrchestrator {
    pub fn new(
        git: Arc<dyn GitAdapter>,
        composer: Arc<dyn MessageComposer>,
        logger: ActivityLogger,
    ) -> Self {
        Self {
            git,
            composer,
            logger,
        }
    }

    /// Compose the message, stage the files, and create the commit.
    ///
    /// Staging or commit failures from the adapter propagate as hard errors
    /// rather than being retried or reinterpreted here.
    pub async fn execute(
        &self,
        task_id: &str,
        subtask: &SubtaskInfo,
        changed_files: &[PathBuf],
        green_results: &TestResult,
    ) -> Result<CommitPhaseResult> {
        if changed_files.is_empty() {
            let result = CommitPhaseResult {
                success: false,
                phase: TddPhase::Commit,
                commit_hash: None,
                message: None,
                error: Some("No files to commit".to_string()),
                timestamp: Utc::now(),
            };
            self.log(subtask, &result);
            return Ok(result);
        }

        let request = CommitMessageRequest {
            change_type: "feat".to_string(),
            description: subtask.title.clone(),
            changed_files: changed_files.to_vec(),
            task_id: task_id.to_string(),
            subtask_id: subtask.id.clone(),
            tests_passing: green_results.pass_count,
            tests_failing: green_results.failure_count,
        };

        let message = self.composer.generate_message(&request).await?;
        self.git.stage_files(changed_files).await?;
        let commit_hash = self.git.create_commit(&message).await?;

        let result = CommitPhaseResult {
            success: true,
            phase: TddPhase::Commit,
            commit_hash: Some(commit_hash),
            message: Some(message),
            error: None,
            timestamp: Utc::now(),
        };
        self.log(subtask, &result);
        Ok(result)
    }

    fn log(&self, subtask: &SubtaskInfo, result: &CommitPhaseResult) {
        let mut metadata = std::collections::BTreeMap::new();
        if let Some(ref hash) = result.commit_hash {
            metadata.insert("commit_hash".to_string(), hash.clone());
        }
        if let Some(ref error) = result.error {
            metadata.insert("error".to_string(), error.clone());
        }
        self.logger
            .log_phase_result(&subtask.id, TddPhase::Commit, result.success, metadata);
    }
}
