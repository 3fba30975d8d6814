//! Durable persistence for one workflow-state record per project.
//!
//! The record lives at `<project>/.redgreen/workflow-state.json` as
//! human-inspectable pretty JSON. Saves overwrite the whole record; there
//! are no partial updates. At most one service/orchestrator pair is assumed
//! to operate against a given state file at a time.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::context::WorkflowState;
use crate::errors::StateError;

#[derive(Clone)]
pub struct WorkflowStateManager {
    state_file: PathBuf,
}

impl WorkflowStateManager {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            state_file: project_dir
                .join(crate::META_DIR)
                .join("workflow-state.json"),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_file
    }

    pub fn exists(&self) -> bool {
        self.state_file.exists()
    }

    /// Load the persisted record. Callers must check `exists()` first or
    /// handle `StateError::NotFound`.
    pub fn load(&self) -> Result<WorkflowState, StateError> {
        if !self.state_file.exists() {
            return Err(StateError::NotFound);
        }

        let content = fs::read_to_string(&self.state_file)
            .with_context(|| format!("Failed to read {}", self.state_file.display()))?;

        serde_json::from_str(&content).map_err(|err| StateError::Corrupted {
            reason: err.to_string(),
        })
    }

    /// Overwrite the whole record.
    pub fn save(&self, state: &WorkflowState) -> Result<()> {
        if let Some(parent) = self.state_file.parent() {
            fs::create_dir_all(parent).context("Failed to create state directory")?;
        }

        let json =
            serde_json::to_string_pretty(state).context("Failed to serialize workflow state")?;
        fs::write(&self.state_file, json)
            .with_context(|| format!("Failed to write {}", self.state_file.display()))?;

        tracing::debug!(path = %self.state_file.display(), "workflow state saved");
        Ok(())
    }

    /// Remove the record. Idempotent: deleting an absent record succeeds.
    pub fn delete(&self) -> Result<()> {
        if self.state_file.exists() {
            fs::remove_file(&self.state_file)
                .with_context(|| format!("Failed to delete {}", self.state_file.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtask::{SubtaskInfo, SubtaskSpec};
    use crate::workflow::context::{TddPhase, WorkflowContext, WorkflowPhase};
    use chrono::Utc;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn make_state() -> WorkflowState {
        let subtasks = vec![
            SubtaskInfo::new(&SubtaskSpec::new("6.1", "First"), 3),
            SubtaskInfo::new(&SubtaskSpec::new("6.2", "Second"), 3),
        ];
        let mut context = WorkflowContext::new("6", subtasks);
        context.branch_name = Some("task-6-demo".to_string());

        WorkflowState {
            workflow_id: Uuid::new_v4(),
            saved_at: Utc::now(),
            context,
            phase: WorkflowPhase::SubtaskLoop,
            tdd_phase: Some(TddPhase::Red),
        }
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let manager = WorkflowStateManager::new(dir.path());

        assert!(!manager.exists());
        assert!(matches!(manager.load(), Err(StateError::NotFound)));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let manager = WorkflowStateManager::new(dir.path());
        let state = make_state();

        manager.save(&state).unwrap();
        assert!(manager.exists());

        let loaded = manager.load().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_save_overwrites_whole_record() {
        let dir = tempdir().unwrap();
        let manager = WorkflowStateManager::new(dir.path());

        let mut state = make_state();
        manager.save(&state).unwrap();

        state.tdd_phase = Some(TddPhase::Green);
        state.context.current_subtask_index = 1;
        manager.save(&state).unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(loaded.tdd_phase, Some(TddPhase::Green));
        assert_eq!(loaded.context.current_subtask_index, 1);
    }

    #[test]
    fn test_corrupted_file_is_reported_distinctly() {
        let dir = tempdir().unwrap();
        let manager = WorkflowStateManager::new(dir.path());

        fs::create_dir_all(manager.state_path().parent().unwrap()).unwrap();
        fs::write(manager.state_path(), "{ not valid json").unwrap();

        assert!(matches!(manager.load(), Err(StateError::Corrupted { .. })));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let manager = WorkflowStateManager::new(dir.path());

        manager.delete().unwrap();

        manager.save(&make_state()).unwrap();
        manager.delete().unwrap();
        assert!(!manager.exists());
        manager.delete().unwrap();
    }

    #[test]
    fn test_state_file_is_human_inspectable() {
        let dir = tempdir().unwrap();
        let manager = WorkflowStateManager::new(dir.path());
        manager.save(&make_state()).unwrap();

        let raw = fs::read_to_string(manager.state_path()).unwrap();
        // Pretty-printed JSON spans multiple lines and names its fields.
        assert!(raw.lines().count() > 5);
        assert!(raw.contains("\"task_id\""));
        assert!(raw.contains("\"subtask_loop\""));
    }
}
