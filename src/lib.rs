//! TDD workflow orchestration.
//!
//! `redgreen` drives an AI coding agent through a disciplined
//! RED/GREEN/COMMIT cycle per subtask, on a dedicated git branch, with
//! durable, resumable state. Version control, test evaluation, and commit
//! message composition are injected behind traits; callers embed the
//! [`WorkflowService`] facade and supply their own surfaces on top.

/// Directory under the project root holding the state file and activity
/// log. Excluded from the clean-working-tree check so the orchestrator's
/// own records never block a restart.
pub(crate) const META_DIR: &str = ".redgreen";

pub mod audit;
pub mod errors;
pub mod evaluator;
pub mod git;
pub mod phases;
pub mod subtask;
pub mod workflow;

pub use errors::{StateError, TransitionError, WorkflowError};
pub use evaluator::TestEvaluator;
pub use git::{Git2Adapter, GitAdapter};
pub use phases::{
    AttemptTracker, CommitPhaseOrchestrator, ConventionalComposer, GreenPhaseOrchestrator,
    MessageComposer, RedPhaseOrchestrator,
};
pub use subtask::{SubtaskInfo, SubtaskSpec, SubtaskStatus};
pub use workflow::{
    CommitOutcome, NextAction, PhaseCompletion, Progress, StartOptions, TddPhase, TestResult,
    WorkflowContext, WorkflowEvent, WorkflowOrchestrator, WorkflowPhase, WorkflowService,
    WorkflowState, WorkflowStateManager, WorkflowStatus,
};
