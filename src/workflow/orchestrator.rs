//! The authoritative workflow state machine.
//!
//! Owns one `WorkflowContext` plus the current phase pair, accepts discrete
//! transition events, and mutates state only through `transition`. Illegal
//! events fail loudly; they never silently no-op. When auto-persistence is
//! enabled, the full state is handed to the persistence hook after every
//! successful transition, so the on-disk record never lags the in-memory
//! state by more than one transition.

use chrono::Utc;
use uuid::Uuid;

use super::context::{
    Progress, TddPhase, WorkflowContext, WorkflowEvent, WorkflowPhase, WorkflowState,
};
use crate::errors::{StateError, TransitionError};
use crate::phases::transition::validate_transition;
use crate::subtask::{SubtaskInfo, SubtaskStatus};

type PersistHook = Box<dyn FnMut(&WorkflowState) -> anyhow::Result<()> + Send>;

pub struct WorkflowOrchestrator {
    workflow_id: Uuid,
    context: WorkflowContext,
    phase: WorkflowPhase,
    tdd_phase: Option<TddPhase>,
    persist_hook: Option<PersistHook>,
}

impl WorkflowOrchestrator {
    /// Create an orchestrator at the start of the lifecycle (`Preflight`,
    /// no TDD phase).
    pub fn new(context: WorkflowContext) -> Self {
        Self {
            workflow_id: Uuid::new_v4(),
            context,
            phase: WorkflowPhase::Preflight,
            tdd_phase: None,
            persist_hook: None,
        }
    }

    /// Register the persistence hook. Idempotent: replaces any prior hook.
    pub fn enable_auto_persist(&mut self, hook: PersistHook) {
        self.persist_hook = Some(hook);
    }

    pub fn current_phase(&self) -> WorkflowPhase {
        self.phase
    }

    pub fn current_tdd_phase(&self) -> Option<TddPhase> {
        self.tdd_phase
    }

    pub fn context(&self) -> &WorkflowContext {
        &self.context
    }

    pub fn current_subtask(&self) -> Option<&SubtaskInfo> {
        self.context.current_subtask()
    }

    /// Progress over the subtask list. `current` is 1-based for display;
    /// `percentage` is 0 for an empty list.
    pub fn progress(&self) -> Progress {
        let completed = self.context.completed_count();
        let total = self.context.subtasks.len();
        let percentage = if total == 0 {
            0
        } else {
            ((100.0 * completed as f64 / total as f64).round()) as u32
        };
        Progress {
            completed,
            total,
            current: self.context.current_subtask_index + 1,
            percentage,
        }
    }

    /// Append a diagnostic failure record to the context.
    pub fn record_error(&mut self, message: &str) {
        self.context.errors.push(message.to_string());
    }

    /// Sync the persisted attempt count of the subtask under the cursor.
    pub fn record_attempts_on_current(&mut self, attempts: u32) {
        let index = self.context.current_subtask_index;
        if let Some(subtask) = self.context.subtasks.get_mut(index) {
            subtask.attempts = attempts;
        }
    }

    /// Set a context metadata entry. Not persisted on its own; the next
    /// successful transition carries it.
    pub fn set_metadata(&mut self, key: &str, value: &str) {
        self.context
            .metadata
            .insert(key.to_string(), value.to_string());
    }

    pub fn remove_metadata(&mut self, key: &str) {
        self.context.metadata.remove(key);
    }

    /// The full serializable state as of now.
    pub fn snapshot(&self) -> WorkflowState {
        WorkflowState {
            workflow_id: self.workflow_id,
            saved_at: Utc::now(),
            context: self.context.clone(),
            phase: self.phase,
            tdd_phase: self.tdd_phase,
        }
    }

    /// Apply a transition event.
    ///
    /// On success the auto-persist hook (if any) runs before control returns
    /// to the caller. On failure nothing is mutated or persisted.
    pub fn transition(&mut self, event: WorkflowEvent) -> Result<(), TransitionError> {
        match (self.phase, &event) {
            (WorkflowPhase::Preflight, WorkflowEvent::PreflightComplete) => {
                self.phase = WorkflowPhase::BranchSetup;
            }

            (WorkflowPhase::BranchSetup, WorkflowEvent::BranchCreated { branch_name }) => {
                if self.context.branch_name.is_some() {
                    return Err(TransitionError::BranchAlreadySet);
                }
                self.context.branch_name = Some(branch_name.clone());
                self.phase = WorkflowPhase::SubtaskLoop;
                self.tdd_phase = Some(TddPhase::Red);
            }

            (WorkflowPhase::SubtaskLoop, WorkflowEvent::RedPhaseComplete { .. })
                if self.tdd_phase == Some(TddPhase::Red) =>
            {
                validate_transition(TddPhase::Red, TddPhase::Green)?;
                self.tdd_phase = Some(TddPhase::Green);
            }

            (WorkflowPhase::SubtaskLoop, WorkflowEvent::GreenPhaseComplete { .. })
                if self.tdd_phase == Some(TddPhase::Green) =>
            {
                validate_transition(TddPhase::Green, TddPhase::Commit)?;
                self.tdd_phase = Some(TddPhase::Commit);
            }

            (WorkflowPhase::SubtaskLoop, WorkflowEvent::CommitComplete)
                if self.tdd_phase == Some(TddPhase::Commit) =>
            {
                let index = self.context.current_subtask_index;
                let subtask = self
                    .context
                    .subtasks
                    .get_mut(index)
                    .ok_or(TransitionError::NoSubtaskRemaining)?;
                subtask.status = SubtaskStatus::Completed;
            }

            (WorkflowPhase::SubtaskLoop, WorkflowEvent::SubtaskComplete)
                if self.tdd_phase == Some(TddPhase::Commit) =>
            {
                if self.context.current_subtask_index + 1 >= self.context.subtasks.len() {
                    return Err(TransitionError::NoSubtaskRemaining);
                }
                validate_transition(TddPhase::Commit, TddPhase::Red)?;
                self.context.current_subtask_index += 1;
                self.tdd_phase = Some(TddPhase::Red);
            }

            (WorkflowPhase::SubtaskLoop, WorkflowEvent::AllSubtasksComplete)
                if self.tdd_phase == Some(TddPhase::Commit) =>
            {
                let remaining = self.context.subtasks.len() - self.context.completed_count();
                if remaining > 0 {
                    return Err(TransitionError::SubtasksRemaining { remaining });
                }
                self.phase = WorkflowPhase::Complete;
                self.tdd_phase = None;
            }

            (phase, WorkflowEvent::Abort) if !phase.is_terminal() => {
                self.phase = WorkflowPhase::Aborted;
                self.tdd_phase = None;
            }

            _ => {
                return Err(TransitionError::IllegalEvent {
                    phase: self.phase_label(),
                    event: event.name(),
                });
            }
        }

        self.persist()
    }

    fn phase_label(&self) -> String {
        match self.tdd_phase {
            Some(tdd) => format!("{}/{}", self.phase, tdd),
            None => self.phase.to_string(),
        }
    }

    fn persist(&mut self) -> Result<(), TransitionError> {
        if let Some(hook) = self.persist_hook.as_mut() {
            let state = WorkflowState {
                workflow_id: self.workflow_id,
                saved_at: Utc::now(),
                context: self.context.clone(),
                phase: self.phase,
                tdd_phase: self.tdd_phase,
            };
            hook(&state).map_err(TransitionError::Persist)?;
        }
        Ok(())
    }

    /// Validate the structural soundness of a loaded state without adopting
    /// it.
    pub fn can_resume_from_state(state: &WorkflowState) -> Result<(), StateError> {
        let len = state.context.subtasks.len();
        if len == 0 {
            return Err(StateError::EmptySubtasks);
        }
        if state.context.current_subtask_index > len {
            return Err(StateError::IndexOutOfRange {
                index: state.context.current_subtask_index,
                len,
            });
        }

        // A TDD phase exists exactly while the subtask loop runs.
        let tdd_consistent = match state.phase {
            WorkflowPhase::SubtaskLoop => state.tdd_phase.is_some(),
            _ => state.tdd_phase.is_none(),
        };
        if !tdd_consistent {
            return Err(StateError::PhaseMismatch {
                phase: state.phase,
                tdd_phase: state.tdd_phase,
            });
        }

        // Once past branch setup the branch must have been recorded.
        if matches!(
            state.phase,
            WorkflowPhase::SubtaskLoop | WorkflowPhase::Complete
        ) && state.context.branch_name.is_none()
        {
            return Err(StateError::MissingBranch { phase: state.phase });
        }

        // A subtask loop must have an in-range cursor.
        if state.phase == WorkflowPhase::SubtaskLoop && state.context.current_subtask_index >= len {
            return Err(StateError::IndexOutOfRange {
                index: state.context.current_subtask_index,
                len,
            });
        }

        Ok(())
    }

    /// Adopt a loaded state wholesale. Not a merge: the orchestrator's
    /// context and phase are replaced entirely.
    pub fn restore_state(&mut self, state: WorkflowState) -> Result<(), StateError> {
        Self::can_resume_from_state(&state)?;
        self.workflow_id = state.workflow_id;
        self.context = state.context;
        self.phase = state.phase;
        self.tdd_phase = state.tdd_phase;
        Ok(())
    }

    /// Build an orchestrator directly from a validated state.
    pub fn from_state(state: WorkflowState) -> Result<Self, StateError> {
        Self::can_resume_from_state(&state)?;
        Ok(Self {
            workflow_id: state.workflow_id,
            context: state.context,
            phase: state.phase,
            tdd_phase: state.tdd_phase,
            persist_hook: None,
        })
    }
}
