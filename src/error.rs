//! Error taxonomy surfaced to callers of the synchronization core.

use thiserror::Error;
use validator::ValidationErrors;

use crate::gateway::GatewayError;
use crate::state::machine::InvalidAction;

/// Errors surfaced by the synchronization core.
///
/// The taxonomy distinguishes local validation failures (never reach the
/// network), remote-confirmed conflicts (specific, user-actionable), and
/// connectivity problems (absorbed by the monitor until retries exhaust).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Invalid input rejected before any network call.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Action attempted outside its legal phase set; rejected locally.
    #[error(transparent)]
    IllegalAction(#[from] InvalidAction),
    /// Operation cannot be performed in the current local state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// The acting user does not occupy a seat in this match.
    #[error("acting user is not a participant of this match")]
    NotParticipant,
    /// The user already has an open or in-review dispute on this match.
    #[error("a dispute for this match is already open or in review")]
    DuplicateDispute,
    /// Remote-confirmed conflict, surfaced with the remote message verbatim.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The remote service could not be reached.
    #[error("arena service unreachable")]
    Unavailable(#[source] GatewayError),
    /// A command was sent but no confirming update arrived within the bound.
    /// Not a success, not a failure; the caller should refresh.
    #[error("command outcome unknown; refresh the match")]
    OutcomeUnknown,
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::DuplicateDispute => ServiceError::DuplicateDispute,
            GatewayError::Conflict(message) => ServiceError::Conflict(message),
            GatewayError::NotFound(message) => ServiceError::NotFound(message),
            GatewayError::Rejected(message) => ServiceError::InvalidState(message),
            GatewayError::Transport { .. } => ServiceError::Unavailable(err),
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {err}"))
    }
}
