//! Legal transitions between the three TDD phases.
//!
//! The adjacency table encodes the only valid edges in the cycle:
//! ```text
//! RED → GREEN → COMMIT → RED (next subtask)
//! ```
//! Every other ordered pair, including RED → COMMIT and GREEN → RED, is
//! illegal.

use crate::errors::TransitionError;
use crate::workflow::context::TddPhase;

/// Whether moving from `from` to `to` is a legal TDD transition.
pub fn can_transition(from: TddPhase, to: TddPhase) -> bool {
    use TddPhase::*;
    matches!((from, to), (Red, Green) | (Green, Commit) | (Commit, Red))
}

/// Result-with-error wrapper around [`can_transition`] for callers that want
/// a message rather than a boolean.
pub fn validate_transition(from: TddPhase, to: TddPhase) -> Result<(), TransitionError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(TransitionError::IllegalTddTransition { from, to })
    }
}
