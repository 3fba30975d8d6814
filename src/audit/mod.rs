//! Audit records for workflow activity.
//!
//! Records are write-only from the orchestrator's point of view: nothing in
//! the state machine reads them back to make decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::workflow::context::TddPhase;

/// One line in the activity log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityRecord {
    /// A phase boundary was crossed.
    PhaseTransition {
        timestamp: DateTime<Utc>,
        subtask_id: String,
        from: String,
        to: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        metadata: BTreeMap<String, String>,
    },
    /// A phase attempt finished, successfully or not.
    PhaseResult {
        timestamp: DateTime<Utc>,
        subtask_id: String,
        phase: TddPhase,
        success: bool,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        metadata: BTreeMap<String, String>,
    },
}

impl ActivityRecord {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::PhaseTransition { timestamp, .. } | Self::PhaseResult { timestamp, .. } => {
                *timestamp
            }
        }
    }

    pub fn subtask_id(&self) -> &str {
        match self {
            Self::PhaseTransition { subtask_id, .. } | Self::PhaseResult { subtask_id, .. } => {
                subtask_id
            }
        }
    }
}

pub mod logger;
pub use logger::ActivityLogger;
