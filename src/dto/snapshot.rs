//! The match document as returned by the fetch endpoint.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::machine::MatchPhase;
use crate::state::projection::{MatchMode, Seat};

/// Full match document as returned by the "get match by id" endpoint.
///
/// Timestamps travel as epoch milliseconds; the projection converts them to
/// absolute [`time::OffsetDateTime`] values on application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSnapshot {
    /// Match identifier.
    pub id: Uuid,
    /// Authoritative phase at fetch time.
    pub phase: MatchPhase,
    /// Matchmaking mode; informational only.
    pub mode: MatchMode,
    /// Absolute start timestamp, set when the match enters `InProgress`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at_ms: Option<i64>,
    /// Absolute end timestamp; immutable once set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_at_ms: Option<i64>,
    /// Stake locked at creation, in platform credits.
    pub stake_amount: u64,
    /// Allowed match duration in milliseconds, fixed at creation.
    pub time_limit_ms: u64,
    /// Occupied seats; at most one entry per seat.
    pub participants: Vec<ParticipantSnapshot>,
    /// Seat occupied by the viewing user, when they participate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_seat: Option<Seat>,
    /// The viewing user's own submission, never the opponent's.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_submission: Option<SubmissionSnapshot>,
}

/// One seat's occupant as returned by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantSnapshot {
    /// Platform user identifier.
    pub user_id: Uuid,
    /// Display name.
    pub username: String,
    /// Optional avatar URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Which of the two fixed slots this participant occupies.
    pub seat: Seat,
    /// When the participant joined; immutable.
    pub joined_at_ms: i64,
    /// When readiness was acknowledged; set once, never cleared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_at_ms: Option<i64>,
    /// Whether a submission exists for this seat. Monotonic.
    pub has_submitted: bool,
    /// Whether the submission is locked. Monotonic, implies `has_submitted`.
    pub has_locked: bool,
    /// When this seat forfeited, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forfeit_at_ms: Option<i64>,
}

/// The viewing user's submission. Opponent submissions are deliberately
/// reduced to the booleans on [`ParticipantSnapshot`] pre-judging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionSnapshot {
    /// Opaque artifact reference (repository URL, archive id, ...).
    pub artifact: String,
    /// When the submission was last uploaded.
    pub submitted_at_ms: i64,
    /// Whether the submission has been irreversibly locked.
    pub locked: bool,
}
