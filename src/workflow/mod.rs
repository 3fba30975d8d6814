//! Workflow state machine, persistence, and facade.

pub mod context;
pub mod orchestrator;
pub mod service;
pub mod state;

pub use context::{
    Progress, TddPhase, TestResult, WorkflowContext, WorkflowEvent, WorkflowPhase, WorkflowState,
};
pub use orchestrator::WorkflowOrchestrator;
pub use service::{
    CommitOutcome, NextAction, PhaseCompletion, StartOptions, WorkflowService, WorkflowStatus,
    derive_branch_name,
};
pub use state::WorkflowStateManager;
