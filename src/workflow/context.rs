//! Core data model for a workflow run.
//!
//! `WorkflowContext` is the mutable, persisted heart of a run; `WorkflowState`
//! is the exact shape written to and reloaded from the state file and must
//! round-trip losslessly through serde_json.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::subtask::SubtaskInfo;

/// Top-level phase of a workflow run.
///
/// Exactly one is active at a time:
/// `Preflight → BranchSetup → SubtaskLoop → Complete`, with `Aborted`
/// reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Preflight,
    BranchSetup,
    SubtaskLoop,
    Complete,
    Aborted,
}

impl WorkflowPhase {
    /// Whether this is a terminal phase (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Aborted)
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preflight => write!(f, "PREFLIGHT"),
            Self::BranchSetup => write!(f, "BRANCH_SETUP"),
            Self::SubtaskLoop => write!(f, "SUBTASK_LOOP"),
            Self::Complete => write!(f, "COMPLETE"),
            Self::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Inner TDD phase, only meaningful while the workflow is in `SubtaskLoop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TddPhase {
    Red,
    Green,
    Commit,
}

impl fmt::Display for TddPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Red => write!(f, "RED"),
            Self::Green => write!(f, "GREEN"),
            Self::Commit => write!(f, "COMMIT"),
        }
    }
}

/// Test-suite evidence for one RED or GREEN attempt.
///
/// Ephemeral: never persisted as part of the workflow state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub passed: bool,
    pub total_tests: u32,
    pub pass_count: u32,
    pub failure_count: u32,
    pub has_failures: bool,
}

impl TestResult {
    /// A fully passing run of `total` tests.
    pub fn passing(total: u32) -> Self {
        Self {
            passed: total > 0,
            total_tests: total,
            pass_count: total,
            failure_count: 0,
            has_failures: false,
        }
    }

    /// A run of `total` tests with `failing` failures.
    pub fn failing(total: u32, failing: u32) -> Self {
        Self {
            passed: false,
            total_tests: total,
            pass_count: total.saturating_sub(failing),
            failure_count: failing,
            has_failures: failing > 0,
        }
    }

    /// Check internal consistency of caller-supplied evidence.
    ///
    /// Malformed evidence must be rejected at the service boundary before it
    /// reaches the state machine.
    pub fn validate(&self) -> Result<(), String> {
        if self.pass_count.checked_add(self.failure_count) != Some(self.total_tests) {
            return Err(format!(
                "pass_count ({}) + failure_count ({}) must equal total_tests ({})",
                self.pass_count, self.failure_count, self.total_tests
            ));
        }
        if self.has_failures != (self.failure_count > 0) {
            return Err(format!(
                "has_failures ({}) inconsistent with failure_count ({})",
                self.has_failures, self.failure_count
            ));
        }
        let expect_passed = self.failure_count == 0 && self.total_tests > 0;
        if self.passed != expect_passed {
            return Err(format!(
                "passed ({}) inconsistent with failure_count ({}) and total_tests ({})",
                self.passed, self.failure_count, self.total_tests
            ));
        }
        Ok(())
    }
}

/// Transition events accepted by the workflow state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    PreflightComplete,
    BranchCreated { branch_name: String },
    RedPhaseComplete { test_results: TestResult },
    GreenPhaseComplete { test_results: TestResult },
    CommitComplete,
    SubtaskComplete,
    AllSubtasksComplete,
    Abort,
}

impl WorkflowEvent {
    /// Stable event name for diagnostics and audit records.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PreflightComplete => "PREFLIGHT_COMPLETE",
            Self::BranchCreated { .. } => "BRANCH_CREATED",
            Self::RedPhaseComplete { .. } => "RED_PHASE_COMPLETE",
            Self::GreenPhaseComplete { .. } => "GREEN_PHASE_COMPLETE",
            Self::CommitComplete => "COMMIT_COMPLETE",
            Self::SubtaskComplete => "SUBTASK_COMPLETE",
            Self::AllSubtasksComplete => "ALL_SUBTASKS_COMPLETE",
            Self::Abort => "ABORT",
        }
    }
}

/// Progress summary over the subtask list.
///
/// `current` is 1-based for human display; `percentage` is rounded and is 0
/// when the workflow has no subtasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub current: usize,
    pub percentage: u32,
}

/// The mutable record describing an in-progress run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowContext {
    /// Identifier of the parent unit of work
    pub task_id: String,
    /// Ordered subtasks; order is fixed at workflow start and never changes
    pub subtasks: Vec<SubtaskInfo>,
    /// Zero-based cursor into `subtasks`; always `<= subtasks.len()`
    pub current_subtask_index: usize,
    /// Set once after branch setup completes, immutable thereafter
    pub branch_name: Option<String>,
    /// Append-only diagnostic record of failures; non-authoritative
    #[serde(default)]
    pub errors: Vec<String>,
    /// Free-form key/value bag (start timestamp, task title, caller tags)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl WorkflowContext {
    pub fn new(task_id: &str, subtasks: Vec<SubtaskInfo>) -> Self {
        Self {
            task_id: task_id.to_string(),
            subtasks,
            current_subtask_index: 0,
            branch_name: None,
            errors: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// The subtask under the cursor, if the cursor is in range.
    pub fn current_subtask(&self) -> Option<&SubtaskInfo> {
        self.subtasks.get(self.current_subtask_index)
    }

    pub fn completed_count(&self) -> usize {
        self.subtasks.iter().filter(|s| s.is_completed()).count()
    }
}

/// The serialized unit handed to the persistence layer after every
/// transition. Must reproduce an identical orchestrator when reloaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowState {
    pub workflow_id: Uuid,
    pub saved_at: DateTime<Utc>,
    pub context: WorkflowContext,
    pub phase: WorkflowPhase,
    pub tdd_phase: Option<TddPhase>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtask::{SubtaskSpec, SubtaskStatus};

    fn make_subtasks() -> Vec<SubtaskInfo> {
        vec![
            SubtaskInfo::new(&SubtaskSpec::new("6.1", "First"), 3),
            SubtaskInfo::new(&SubtaskSpec::new("6.2", "Second"), 3),
        ]
    }

    #[test]
    fn test_workflow_phase_terminal() {
        assert!(WorkflowPhase::Complete.is_terminal());
        assert!(WorkflowPhase::Aborted.is_terminal());
        assert!(!WorkflowPhase::Preflight.is_terminal());
        assert!(!WorkflowPhase::BranchSetup.is_terminal());
        assert!(!WorkflowPhase::SubtaskLoop.is_terminal());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(WorkflowPhase::SubtaskLoop.to_string(), "SUBTASK_LOOP");
        assert_eq!(TddPhase::Red.to_string(), "RED");
        assert_eq!(TddPhase::Commit.to_string(), "COMMIT");
    }

    #[test]
    fn test_test_result_passing() {
        let result = TestResult::passing(4);
        assert!(result.passed);
        assert_eq!(result.pass_count, 4);
        assert_eq!(result.failure_count, 0);
        assert!(!result.has_failures);
        result.validate().unwrap();
    }

    #[test]
    fn test_test_result_failing() {
        let result = TestResult::failing(5, 2);
        assert!(!result.passed);
        assert_eq!(result.pass_count, 3);
        assert_eq!(result.failure_count, 2);
        assert!(result.has_failures);
        result.validate().unwrap();
    }

    #[test]
    fn test_test_result_zero_tests_not_passed() {
        let result = TestResult::passing(0);
        assert!(!result.passed);
        result.validate().unwrap();
    }

    #[test]
    fn test_test_result_validate_rejects_count_mismatch() {
        let result = TestResult {
            passed: false,
            total_tests: 3,
            pass_count: 1,
            failure_count: 1,
            has_failures: true,
        };
        let err = result.validate().unwrap_err();
        assert!(err.contains("total_tests"));
    }

    #[test]
    fn test_test_result_validate_rejects_overflowing_counts() {
        let result = TestResult {
            passed: false,
            total_tests: 1,
            pass_count: u32::MAX,
            failure_count: 2,
            has_failures: true,
        };
        let err = result.validate().unwrap_err();
        assert!(err.contains("must equal total_tests"));
    }

    #[test]
    fn test_test_result_validate_rejects_has_failures_mismatch() {
        let result = TestResult {
            passed: false,
            total_tests: 2,
            pass_count: 1,
            failure_count: 1,
            has_failures: false,
        };
        assert!(result.validate().is_err());
    }

    #[test]
    fn test_test_result_validate_rejects_passed_mismatch() {
        let result = TestResult {
            passed: true,
            total_tests: 2,
            pass_count: 1,
            failure_count: 1,
            has_failures: true,
        };
        assert!(result.validate().is_err());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(WorkflowEvent::PreflightComplete.name(), "PREFLIGHT_COMPLETE");
        assert_eq!(
            WorkflowEvent::BranchCreated {
                branch_name: "x".into()
            }
            .name(),
            "BRANCH_CREATED"
        );
        assert_eq!(WorkflowEvent::Abort.name(), "ABORT");
    }

    #[test]
    fn test_context_current_subtask_and_completed_count() {
        let mut ctx = WorkflowContext::new("6", make_subtasks());
        assert_eq!(ctx.current_subtask().unwrap().id, "6.1");
        assert_eq!(ctx.completed_count(), 0);

        ctx.subtasks[0].status = SubtaskStatus::Completed;
        assert_eq!(ctx.completed_count(), 1);

        ctx.current_subtask_index = 2;
        assert!(ctx.current_subtask().is_none());
    }

    #[test]
    fn test_workflow_state_roundtrip() {
        let mut ctx = WorkflowContext::new("6", make_subtasks());
        ctx.branch_name = Some("task-6-demo".to_string());
        ctx.metadata.insert("task_title".into(), "Demo".into());
        ctx.errors.push("first attempt failed".into());

        let state = WorkflowState {
            workflow_id: Uuid::new_v4(),
            saved_at: Utc::now(),
            context: ctx,
            phase: WorkflowPhase::SubtaskLoop,
            tdd_phase: Some(TddPhase::Green),
        };

        let json = serde_json::to_string_pretty(&state).unwrap();
        let parsed: WorkflowState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, parsed);
    }
}
