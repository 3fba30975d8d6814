//! Subtask definitions for the TDD workflow.
//!
//! A subtask is one unit of work within a task, processed by exactly one
//! RED/GREEN/COMMIT cycle. `SubtaskSpec` is the caller-facing input shape;
//! `SubtaskInfo` is the tracked form that lives inside the workflow context.

use serde::{Deserialize, Serialize};

/// Completion status of a single subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    Completed,
}

/// Caller input describing one subtask to execute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubtaskSpec {
    /// Subtask identifier (e.g., "6.1")
    pub id: String,
    /// Human-readable title of the subtask
    #[serde(default)]
    pub title: String,
}

impl SubtaskSpec {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
        }
    }
}

/// One subtask as tracked by a running workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubtaskInfo {
    /// Subtask identifier (e.g., "6.1")
    pub id: String,
    /// Human-readable title of the subtask
    pub title: String,
    /// Current completion status
    pub status: SubtaskStatus,
    /// Number of attempts recorded against this subtask
    pub attempts: u32,
    /// Maximum attempts allowed before the caller should stop retrying
    pub max_attempts: u32,
}

impl SubtaskInfo {
    pub fn new(spec: &SubtaskSpec, max_attempts: u32) -> Self {
        Self {
            id: spec.id.clone(),
            title: spec.title.clone(),
            status: SubtaskStatus::Pending,
            attempts: 0,
            max_attempts,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == SubtaskStatus::Completed
    }
}
