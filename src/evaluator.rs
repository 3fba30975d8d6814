//! Test evaluation boundary.
//!
//! The orchestrator never runs a test suite itself; it hands candidate test
//! or implementation code to an injected evaluator once per RED or GREEN
//! attempt and consumes the reported counts. Concrete evaluators (process
//! spawning test runners, AI judges) live outside this crate.

use anyhow::Result;
use async_trait::async_trait;

use crate::workflow::context::TestResult;

#[async_trait]
pub trait TestEvaluator: Send + Sync {
    /// Run the project's test suite against the candidate code and report
    /// pass/fail counts.
    async fn validate_test_results(&self, code: &str) -> Result<TestResult>;
}
