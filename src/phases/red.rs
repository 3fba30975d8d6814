//! RED phase: write a failing test.
//!
//! The phase succeeds only when the generated test code produces at least
//! one failing test — a fully passing suite means the test exercises nothing
//! new and the caller should retry test authoring rather than advance.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::audit::ActivityLogger;
use crate::evaluator::TestEvaluator;
use crate::subtask::SubtaskInfo;
use crate::workflow::context::{TddPhase, TestResult};

/// Outcome of one RED phase attempt.
#[derive(Debug, Clone)]
pub struct RedPhaseResult {
    pub success: bool,
    pub phase: TddPhase,
    pub tests_generated: bool,
    pub test_results: Option<TestResult>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RedPhaseResult {
    fn failure(tests_generated: bool, results: Option<TestResult>, error: &str) -> Self {
        Self {
            success: false,
            phase: TddPhase::Red,
            tests_generated,
            test_results: results,
            error: Some(error.to_string()),
            timestamp: Utc::now(),
        }
    }
}

/// Check the RED invariant: the suite ran at least one test and at least one
/// of them failed.
pub fn validate_red(results: &TestResult) -> Result<(), String> {
    if results.total_tests == 0 {
        return Err(
            "RED phase requires at least one failing test, but no tests were executed".to_string(),
        );
    }
    if !results.has_failures || results.failure_count == 0 {
        return Err(format!(
            "RED phase requires at least one failing test, but all {} test(s) passed",
            results.total_tests
        ));
    }
    Ok(())
}

/// Validates generated test code for one subtask.
///
/// Does not consult or update attempt counts; retry policy belongs to the
/// caller.
pub struct RedPhaseOrchestrator {
    evaluator: Arc<dyn TestEvaluator>,
    logger: ActivityLogger,
}

impl RedPhaseOrchestrator {
    pub fn new(evaluator: Arc<dyn TestEvaluator>, logger: ActivityLogger) -> Self {
        Self { evaluator, logger }
    }

    /// Evaluate generated test code and enforce the RED invariant.
    ///
    /// Evaluator failures propagate as hard errors; invariant violations are
    /// structured `success = false` results the caller may retry.
    pub async fn execute(&self, subtask: &SubtaskInfo, test_code: &str) -> Result<RedPhaseResult> {
        if test_code.trim().is_empty() {
            let result = RedPhaseResult::failure(false, None, "No test code was generated");
            self.log(subtask, &result);
            return Ok(result);
        }

        let results = self.evaluator.validate_test_results(test_code).await?;

        let result = match validate_red(&results) {
            Ok(()) => RedPhaseResult {
                success: true,
                phase: TddPhase::Red,
                tests_generated: true,
                test_results: Some(results),
                error: None,
                timestamp: Utc::now(),
            },
            Err(diagnostic) => RedPhaseResult::failure(true, Some(results), &diagnostic),
        };

        self.log(subtask, &result);
        Ok(result)
    }

    fn log(&self, subtask: &SubtaskInfo, result: &RedPhaseResult) {
        let mut metadata = std::collections::BTreeMap::new();
        if let Some(ref results) = result.test_results {
            metadata.insert("total_tests".to_string(), results.total_tests.to_string());
            metadata.insert(
                "failure_count".to_string(),
                results.failure_count.to_string(),
            );
        }
        if let Some(ref error) = result.error {
            metadata.insert("error".to_string(), error.clone());
        }
        self.logger
            .log_phase_result(&subtask.id, TddPhase::Red, result.success, metadata);
    }
}
