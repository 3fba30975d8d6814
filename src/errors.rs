//! Typed error hierarchy for the TDD workflow orchestrator.
//!
//! Three top-level enums cover the three subsystems:
//! - `TransitionError` — illegal state-machine moves
//! - `StateError` — persistence and restore-validation failures
//! - `WorkflowError` — facade-level precondition and collaborator failures
//!
//! Evidence-validation failures (RED without a failing test, GREEN with
//! remaining failures, COMMIT with no files) are expected, retryable
//! outcomes and are returned as structured result values, never as errors.

use thiserror::Error;

use crate::workflow::context::{TddPhase, WorkflowPhase};

/// Errors from the workflow state machine.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Event {event} is not legal in phase {phase}")]
    IllegalEvent { phase: String, event: &'static str },

    #[error("Invalid TDD transition: {from} -> {to}")]
    IllegalTddTransition { from: TddPhase, to: TddPhase },

    #[error("Branch name is already set and cannot be changed")]
    BranchAlreadySet,

    #[error("No further subtask to advance to")]
    NoSubtaskRemaining,

    #[error("Cannot complete workflow: {remaining} subtask(s) still pending")]
    SubtasksRemaining { remaining: usize },

    #[error("State persistence hook failed: {0}")]
    Persist(#[source] anyhow::Error),
}

/// Errors from loading, saving, or validating persisted workflow state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("No persisted workflow state found")]
    NotFound,

    #[error("Workflow state file is corrupted: {reason}")]
    Corrupted { reason: String },

    #[error("Workflow state has an empty subtask list")]
    EmptySubtasks,

    #[error("Subtask index {index} out of range for {len} subtask(s)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Phase {phase} is inconsistent with TDD phase {tdd_phase:?}")]
    PhaseMismatch {
        phase: WorkflowPhase,
        tdd_phase: Option<TddPhase>,
    },

    #[error("Phase {phase} requires a branch name but none is recorded")]
    MissingBranch { phase: WorkflowPhase },

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// Errors surfaced by the `WorkflowService` facade.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("A workflow already exists for this project; pass force=true to replace it")]
    AlreadyExists,

    #[error("No active workflow; start or resume one first")]
    NoActiveWorkflow,

    #[error("Operation requires the subtask loop but workflow is in phase {phase}")]
    NotInSubtaskLoop { phase: WorkflowPhase },

    #[error("Cannot complete the COMMIT phase via complete_phase; use commit() instead")]
    CommitPhaseRequiresCommit,

    #[error("Cannot commit during {phase} phase; complete RED and GREEN phases first")]
    TddCyclePending { phase: TddPhase },

    #[error("No GREEN phase test results available for commit")]
    MissingGreenEvidence,

    #[error("Invalid test result evidence: {reason}")]
    InvalidEvidence { reason: String },

    #[error("Invalid workflow options: {reason}")]
    InvalidOptions { reason: String },

    #[error("Persisted workflow state may be corrupted ({reason}); start a new workflow")]
    CorruptedState { reason: String },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
