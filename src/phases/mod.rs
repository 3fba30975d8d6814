//! Per-phase orchestration for the RED/GREEN/COMMIT cycle.
//!
//! Each phase orchestrator owns the validation and result shaping for
//! exactly one TDD phase. None of them mutate the workflow state machine or
//! touch retry accounting; the service translates their results into
//! transition events and drives the `AttemptTracker`.

pub mod attempts;
pub mod commit;
pub mod green;
pub mod red;
pub mod transition;

pub use attempts::AttemptTracker;
pub use commit::{
    CommitMessageRequest, CommitPhaseOrchestrator, CommitPhaseResult, ConventionalComposer,
    MessageComposer,
};
pub use green::{GreenPhaseOrchestrator, GreenPhaseResult};
pub use red::{RedPhaseOrchestrator, RedPhaseResult};
