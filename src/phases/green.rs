//! GREEN phase: make the failing test pass.
//!
//! The phase succeeds only when every test passes. On failure the result
//! carries actionable feedback (failing count, passing count, attempt
//! number) to steer the next generation attempt.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::audit::ActivityLogger;
use crate::evaluator::TestEvaluator;
use crate::subtask::SubtaskInfo;
use crate::workflow::context::{TddPhase, TestResult};

/// Outcome of one GREEN phase attempt.
#[derive(Debug, Clone)]
pub struct GreenPhaseResult {
    pub success: bool,
    pub phase: TddPhase,
    pub test_results: Option<TestResult>,
    /// Feedback text for the caller or the next generation attempt
    pub feedback: String,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Check the GREEN invariant: the suite ran at least one test and all of
/// them passed.
pub fn validate_green(results: &TestResult) -> Result<(), String> {
    if results.total_tests == 0 {
        return Err("GREEN phase requires a passing test suite, but no tests were executed".to_string());
    }
    if results.failure_count > 0 || !results.passed {
        return Err(format!(
            "{} test(s) still failing, {} passing",
            results.failure_count, results.pass_count
        ));
    }
    Ok(())
}

/// Validates generated implementation code for one subtask.
pub struct GreenPhaseOrchestrator {
    evaluator: Arc<dyn TestEvaluator>,
    logger: ActivityLogger,
}

impl GreenPhaseOrchestrator {
    pub fn new(evaluator: Arc<dyn TestEvaluator>, logger: ActivityLogger) -> Self {
        Self { evaluator, logger }
    }

    /// Evaluate generated implementation code and enforce the GREEN
    /// invariant. `attempt` feeds the feedback text only; it has no effect
    /// on control flow.
    pub async fn execute(
        &self,
        subtask: &SubtaskInfo,
        implementation_code: &str,
        attempt: u32,
    ) -> Result<GreenPhaseResult> {
        if implementation_code.trim().is_empty() {
            let result = GreenPhaseResult {
                success: false,
                phase: TddPhase::Green,
                test_results: None,
                feedback: format!("Attempt {attempt}: no implementation code was generated"),
                error: Some("No implementation code was generated".to_string()),
                timestamp: Utc::now(),
            };
            self.log(subtask, &result);
            return Ok(result);
        }

        let results = self
            .evaluator
            .validate_test_results(implementation_code)
            .await?;

        let result = match validate_green(&results) {
            Ok(()) => GreenPhaseResult {
                success: true,
                phase: TddPhase::Green,
                feedback: format!("All {} test(s) passing", results.total_tests),
                test_results: Some(results),
                error: None,
                timestamp: Utc::now(),
            },
            Err(diagnostic) => GreenPhaseResult {
                success: false,
                phase: TddPhase::Green,
                feedback: format!("Attempt {attempt}: {diagnostic}"),
                test_results: Some(results),
                error: Some(diagnostic),
                timestamp: Utc::now(),
            },
        };

        self.log(subtask, &result);
        Ok(result)
    }

    fn log(&self, subtask: &SubtaskInfo, result: &GreenPhaseResult) {
        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert("feedback".to_string(), result.feedback.clone());
        if let Some(ref results) = result.test_results {
            metadata.insert("total_tests".to_string(), results.total_tests.to_string());
            metadata.insert("pass_count".to_string(), results.pass_count.to_string());
        }
        self.logger
            .log_phase_result(&subtask.id, TddPhase::Green, result.success, metadata);
    }
}
