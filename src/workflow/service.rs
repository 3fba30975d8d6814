//! The workflow facade consumed by command-line and agent callers.
//!
//! One `WorkflowService` instance per project root; it owns the single live
//! orchestrator, the state manager, the activity logger, and retry
//! accounting. All collaborators are constructor-injected — there is no
//! ambient or global mutable state.

use anyhow::Result;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::LazyLock;

use super::context::{
    Progress, TddPhase, TestResult, WorkflowContext, WorkflowEvent, WorkflowPhase,
};
use super::orchestrator::WorkflowOrchestrator;
use super::state::WorkflowStateManager;
use crate::audit::ActivityLogger;
use crate::errors::WorkflowError;
use crate::evaluator::TestEvaluator;
use crate::git::GitAdapter;
use crate::phases::{
    AttemptTracker, CommitPhaseOrchestrator, GreenPhaseOrchestrator, MessageComposer,
    RedPhaseOrchestrator, green, red,
};
use crate::subtask::{SubtaskInfo, SubtaskSpec};

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("static branch-slug pattern"));

/// Metadata key carrying the passing-test count of the last completed GREEN
/// phase, so the pending-commit evidence survives a process restart.
const GREEN_TESTS_KEY: &str = "green_tests_total";

/// Options for starting a new workflow.
#[derive(Debug, Clone)]
pub struct StartOptions {
    pub task_id: String,
    pub task_title: String,
    pub subtasks: Vec<SubtaskSpec>,
    /// Retry ceiling per (subtask, phase) pair
    pub max_attempts: u32,
    /// Replace an existing persisted workflow instead of refusing
    pub force: bool,
    /// Optional branch prefix (e.g., "feature")
    pub tag: Option<String>,
}

/// Recommended next agent action for the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    GenerateTest,
    ImplementFeature,
    CommitChanges,
    Idle,
}

/// Read-only summary of a workflow, for display layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub task_id: String,
    pub phase: WorkflowPhase,
    pub tdd_phase: Option<TddPhase>,
    pub branch_name: Option<String>,
    pub current_subtask: Option<SubtaskInfo>,
    pub progress: Progress,
    pub next_action: NextAction,
}

/// Outcome of `complete_phase`: either the workflow advanced, or the
/// evidence failed its phase invariant and the caller may retry (bounded by
/// the attempt ceiling).
#[derive(Debug, Clone)]
pub struct PhaseCompletion {
    pub advanced: bool,
    pub phase: TddPhase,
    pub attempt: u32,
    pub attempts_exhausted: bool,
    pub feedback: String,
}

/// Outcome of `commit`.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub committed: bool,
    pub commit_hash: Option<String>,
    pub error: Option<String>,
    /// Whether this commit finished the final subtask
    pub workflow_complete: bool,
}

pub struct WorkflowService {
    state_manager: WorkflowStateManager,
    activity: ActivityLogger,
    attempts: AttemptTracker,
    git: Arc<dyn GitAdapter>,
    red_phase: RedPhaseOrchestrator,
    green_phase: GreenPhaseOrchestrator,
    commit_phase: CommitPhaseOrchestrator,
    orchestrator: Option<WorkflowOrchestrator>,
    /// GREEN evidence held for the pending commit; ephemeral by design
    pending_green: Option<TestResult>,
}

impl WorkflowService {
    pub fn new(
        project_dir: &Path,
        git: Arc<dyn GitAdapter>,
        evaluator: Arc<dyn TestEvaluator>,
        composer: Arc<dyn MessageComposer>,
        max_attempts: u32,
    ) -> Self {
        let activity = ActivityLogger::new(project_dir);
        Self {
            state_manager: WorkflowStateManager::new(project_dir),
            red_phase: RedPhaseOrchestrator::new(Arc::clone(&evaluator), activity.clone()),
            green_phase: GreenPhaseOrchestrator::new(evaluator, activity.clone()),
            commit_phase: CommitPhaseOrchestrator::new(
                Arc::clone(&git),
                composer,
                activity.clone(),
            ),
            activity,
            attempts: AttemptTracker::new(max_attempts),
            git,
            orchestrator: None,
            pending_green: None,
        }
    }

    /// The RED orchestrator, for callers that validate generated test code
    /// before calling `complete_phase`.
    pub fn red_phase(&self) -> &RedPhaseOrchestrator {
        &self.red_phase
    }

    /// The GREEN orchestrator, for callers that validate generated
    /// implementation code before calling `complete_phase`.
    pub fn green_phase(&self) -> &GreenPhaseOrchestrator {
        &self.green_phase
    }

    pub fn attempt_tracker(&self) -> &AttemptTracker {
        &self.attempts
    }

    /// Start a new workflow: preflight the repository, create the branch,
    /// and enter the subtask loop at RED.
    pub async fn start_workflow(
        &mut self,
        options: StartOptions,
    ) -> Result<WorkflowStatus, WorkflowError> {
        Self::validate_options(&options)?;

        if self.state_manager.exists() && !options.force {
            return Err(WorkflowError::AlreadyExists);
        }

        self.git.ensure_repository().await?;
        self.git.ensure_clean_working_tree().await?;

        let subtasks: Vec<SubtaskInfo> = options
            .subtasks
            .iter()
            .map(|spec| SubtaskInfo::new(spec, options.max_attempts))
            .collect();
        let mut context = WorkflowContext::new(&options.task_id, subtasks);
        context
            .metadata
            .insert("task_title".to_string(), options.task_title.clone());
        context
            .metadata
            .insert("started_at".to_string(), Utc::now().to_rfc3339());
        if let Some(ref tag) = options.tag {
            context.metadata.insert("tag".to_string(), tag.clone());
        }

        let mut orchestrator = WorkflowOrchestrator::new(context);
        let state_manager = self.state_manager.clone();
        orchestrator.enable_auto_persist(Box::new(move |state| state_manager.save(state)));

        orchestrator.transition(WorkflowEvent::PreflightComplete)?;

        let branch_name = derive_branch_name(
            &options.task_id,
            &options.task_title,
            options.tag.as_deref(),
        );
        self.git.create_and_checkout_branch(&branch_name).await?;
        orchestrator.transition(WorkflowEvent::BranchCreated {
            branch_name: branch_name.clone(),
        })?;

        tracing::info!(
            task_id = %options.task_id,
            branch = %branch_name,
            subtasks = orchestrator.context().subtasks.len(),
            "workflow started"
        );

        self.attempts = AttemptTracker::new(options.max_attempts);
        self.pending_green = None;
        self.orchestrator = Some(orchestrator);
        self.status()
    }

    /// Resume a persisted workflow after a process restart.
    ///
    /// A state that fails structural validation is reported as corrupted
    /// with guidance to start fresh; no partial repair is attempted.
    pub async fn resume_workflow(&mut self) -> Result<WorkflowStatus, WorkflowError> {
        let state = self.state_manager.load()?;

        let mut orchestrator = WorkflowOrchestrator::from_state(state)
            .map_err(|err| WorkflowError::CorruptedState {
                reason: err.to_string(),
            })?;
        let state_manager = self.state_manager.clone();
        orchestrator.enable_auto_persist(Box::new(move |state| state_manager.save(state)));

        // Rebuild in-memory retry counts from the persisted per-subtask
        // attempt counter for the phase the workflow stopped in.
        if let (Some(tdd), Some(subtask)) = (
            orchestrator.current_tdd_phase(),
            orchestrator.current_subtask(),
        ) {
            self.attempts
                .seed_attempts(&subtask.id, tdd, subtask.attempts);
        }

        tracing::info!(
            task_id = %orchestrator.context().task_id,
            phase = %orchestrator.current_phase(),
            "workflow resumed"
        );

        // A workflow that stopped in COMMIT already has a validated GREEN
        // run behind it; rebuild the evidence from the persisted count.
        self.pending_green = if orchestrator.current_tdd_phase() == Some(TddPhase::Commit) {
            orchestrator
                .context()
                .metadata
                .get(GREEN_TESTS_KEY)
                .and_then(|raw| raw.parse::<u32>().ok())
                .map(TestResult::passing)
        } else {
            None
        };
        self.orchestrator = Some(orchestrator);
        self.status()
    }

    /// Read-only status projection of the live workflow.
    pub fn status(&self) -> Result<WorkflowStatus, WorkflowError> {
        let orchestrator = self
            .orchestrator
            .as_ref()
            .ok_or(WorkflowError::NoActiveWorkflow)?;

        Ok(WorkflowStatus {
            task_id: orchestrator.context().task_id.clone(),
            phase: orchestrator.current_phase(),
            tdd_phase: orchestrator.current_tdd_phase(),
            branch_name: orchestrator.context().branch_name.clone(),
            current_subtask: orchestrator.current_subtask().cloned(),
            progress: orchestrator.progress(),
            next_action: self.next_action(),
        })
    }

    /// The live workflow context.
    pub fn context(&self) -> Result<&WorkflowContext, WorkflowError> {
        self.orchestrator
            .as_ref()
            .map(WorkflowOrchestrator::context)
            .ok_or(WorkflowError::NoActiveWorkflow)
    }

    /// Recommended next agent action; `Idle` when no subtask loop is active.
    pub fn next_action(&self) -> NextAction {
        match self
            .orchestrator
            .as_ref()
            .and_then(WorkflowOrchestrator::current_tdd_phase)
        {
            Some(TddPhase::Red) => NextAction::GenerateTest,
            Some(TddPhase::Green) => NextAction::ImplementFeature,
            Some(TddPhase::Commit) => NextAction::CommitChanges,
            None => NextAction::Idle,
        }
    }

    /// Submit test-result evidence for the current RED or GREEN phase.
    ///
    /// Invariant violations come back as `advanced = false` with feedback
    /// and count against the attempt ceiling; they are expected, retryable
    /// outcomes, not errors.
    pub async fn complete_phase(
        &mut self,
        test_results: TestResult,
    ) -> Result<PhaseCompletion, WorkflowError> {
        let orchestrator = self
            .orchestrator
            .as_mut()
            .ok_or(WorkflowError::NoActiveWorkflow)?;

        let phase = orchestrator.current_phase();
        if phase != WorkflowPhase::SubtaskLoop {
            return Err(WorkflowError::NotInSubtaskLoop { phase });
        }
        let tdd = orchestrator
            .current_tdd_phase()
            .ok_or(WorkflowError::NotInSubtaskLoop { phase })?;
        if tdd == TddPhase::Commit {
            return Err(WorkflowError::CommitPhaseRequiresCommit);
        }

        test_results
            .validate()
            .map_err(|reason| WorkflowError::InvalidEvidence { reason })?;

        let subtask_id = orchestrator
            .current_subtask()
            .map(|s| s.id.clone())
            .ok_or(WorkflowError::NoActiveWorkflow)?;

        // COMMIT was rejected above; only RED and GREEN reach this point.
        let verdict = if tdd == TddPhase::Red {
            red::validate_red(&test_results)
        } else {
            green::validate_green(&test_results)
        };

        match verdict {
            Err(diagnostic) => {
                let attempt = self.attempts.record_attempt(&subtask_id, tdd);
                orchestrator.record_attempts_on_current(attempt);
                orchestrator.record_error(&format!("{tdd} attempt {attempt}: {diagnostic}"));

                let mut metadata = std::collections::BTreeMap::new();
                metadata.insert("attempt".to_string(), attempt.to_string());
                metadata.insert("diagnostic".to_string(), diagnostic.clone());
                self.activity
                    .log_phase_result(&subtask_id, tdd, false, metadata);

                Ok(PhaseCompletion {
                    advanced: false,
                    phase: tdd,
                    attempt,
                    attempts_exhausted: self.attempts.has_exceeded_max_attempts(&subtask_id, tdd),
                    feedback: diagnostic,
                })
            }
            Ok(()) => {
                let (event, next) = if tdd == TddPhase::Red {
                    (
                        WorkflowEvent::RedPhaseComplete {
                            test_results: test_results.clone(),
                        },
                        TddPhase::Green,
                    )
                } else {
                    (
                        WorkflowEvent::GreenPhaseComplete {
                            test_results: test_results.clone(),
                        },
                        TddPhase::Commit,
                    )
                };

                if tdd == TddPhase::Green {
                    // Recorded so a resume that lands in COMMIT can rebuild
                    // the evidence for the pending commit.
                    orchestrator
                        .set_metadata(GREEN_TESTS_KEY, &test_results.total_tests.to_string());
                }
                orchestrator.transition(event)?;
                if tdd == TddPhase::Green {
                    self.pending_green = Some(test_results.clone());
                }

                let attempt = self.attempts.attempt_count(&subtask_id, tdd) + 1;
                self.attempts.reset_attempts(&subtask_id, tdd);
                self.activity.log_phase_transition(
                    &subtask_id,
                    &tdd.to_string(),
                    &next.to_string(),
                    std::collections::BTreeMap::new(),
                );

                let feedback = match tdd {
                    TddPhase::Red => format!(
                        "{} failing test(s) recorded; implement until they pass",
                        test_results.failure_count
                    ),
                    _ => format!("All {} test(s) passing", test_results.total_tests),
                };

                Ok(PhaseCompletion {
                    advanced: true,
                    phase: tdd,
                    attempt,
                    attempts_exhausted: false,
                    feedback,
                })
            }
        }
    }

    /// Commit the changed files for the current subtask and advance to the
    /// next subtask (or finish the workflow).
    pub async fn commit(
        &mut self,
        changed_files: &[PathBuf],
    ) -> Result<CommitOutcome, WorkflowError> {
        let orchestrator = self
            .orchestrator
            .as_mut()
            .ok_or(WorkflowError::NoActiveWorkflow)?;

        let phase = orchestrator.current_phase();
        if phase != WorkflowPhase::SubtaskLoop {
            return Err(WorkflowError::NotInSubtaskLoop { phase });
        }
        match orchestrator.current_tdd_phase() {
            Some(TddPhase::Commit) => {}
            Some(tdd) => return Err(WorkflowError::TddCyclePending { phase: tdd }),
            None => return Err(WorkflowError::NotInSubtaskLoop { phase }),
        }

        let green_results = self
            .pending_green
            .clone()
            .ok_or(WorkflowError::MissingGreenEvidence)?;
        let task_id = orchestrator.context().task_id.clone();
        let subtask = orchestrator
            .current_subtask()
            .cloned()
            .ok_or(WorkflowError::NoActiveWorkflow)?;

        let result = self
            .commit_phase
            .execute(&task_id, &subtask, changed_files, &green_results)
            .await?;

        if !result.success {
            orchestrator.record_error(
                result
                    .error
                    .as_deref()
                    .unwrap_or("COMMIT phase failed"),
            );
            return Ok(CommitOutcome {
                committed: false,
                commit_hash: None,
                error: result.error,
                workflow_complete: false,
            });
        }

        orchestrator.remove_metadata(GREEN_TESTS_KEY);
        orchestrator.transition(WorkflowEvent::CommitComplete)?;

        let last = orchestrator.context().current_subtask_index + 1
            >= orchestrator.context().subtasks.len();
        if last {
            orchestrator.transition(WorkflowEvent::AllSubtasksComplete)?;
        } else {
            orchestrator.transition(WorkflowEvent::SubtaskComplete)?;
        }

        self.activity.log_phase_transition(
            &subtask.id,
            &TddPhase::Commit.to_string(),
            if last { "COMPLETE" } else { "RED" },
            std::collections::BTreeMap::new(),
        );

        // Fresh cycle for the next subtask; stale counts must not leak.
        for tdd in [TddPhase::Red, TddPhase::Green, TddPhase::Commit] {
            self.attempts.reset_attempts(&subtask.id, tdd);
        }
        self.pending_green = None;

        tracing::info!(
            subtask = %subtask.id,
            commit = result.commit_hash.as_deref().unwrap_or(""),
            workflow_complete = last,
            "subtask committed"
        );

        Ok(CommitOutcome {
            committed: true,
            commit_hash: result.commit_hash,
            error: None,
            workflow_complete: last,
        })
    }

    /// Abort the live workflow and delete its persisted state. Idempotent
    /// when no workflow is active.
    pub async fn abort_workflow(&mut self) -> Result<(), WorkflowError> {
        if let Some(mut orchestrator) = self.orchestrator.take() {
            if !orchestrator.current_phase().is_terminal() {
                // Detach persistence first: the state file is about to be
                // deleted, not updated.
                orchestrator.enable_auto_persist(Box::new(|_| Ok(())));
                orchestrator.transition(WorkflowEvent::Abort)?;
            }
            tracing::info!(task_id = %orchestrator.context().task_id, "workflow aborted");
        }
        self.state_manager.delete()?;
        self.pending_green = None;
        Ok(())
    }

    fn validate_options(options: &StartOptions) -> Result<(), WorkflowError> {
        if options.task_id.trim().is_empty() {
            return Err(WorkflowError::InvalidOptions {
                reason: "task_id must not be blank".to_string(),
            });
        }
        if options.subtasks.is_empty() {
            return Err(WorkflowError::InvalidOptions {
                reason: "at least one subtask is required".to_string(),
            });
        }
        if let Some(spec) = options.subtasks.iter().find(|s| s.id.trim().is_empty()) {
            return Err(WorkflowError::InvalidOptions {
                reason: format!("subtask with title {:?} has a blank id", spec.title),
            });
        }
        if options.max_attempts == 0 {
            return Err(WorkflowError::InvalidOptions {
                reason: "max_attempts must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Derive the working branch name from the task id and title.
///
/// The title is lowercased, runs of non-alphanumeric characters collapse to
/// single dashes, leading/trailing dashes are trimmed, and the slug is
/// truncated to 50 characters. Dots in the task id become dashes. The final
/// form is `{tag/}task-{id}-{slug}`.
pub fn derive_branch_name(task_id: &str, title: &str, tag: Option<&str>) -> String {
    let lowered = title.to_lowercase();
    let slug = NON_ALNUM.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    let slug: String = slug.chars().take(50).collect();

    let id = task_id.replace('.', "-");

    match tag {
        Some(tag) => format!("{tag}/task-{id}-{slug}"),
        None => format!("task-{id}-{slug}"),
    }
}
