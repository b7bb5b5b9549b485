//! Judging result shapes returned by the results endpoint.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::projection::Seat;

/// Declared outcome of a judged match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    /// Seat A won.
    WinnerA,
    /// Seat B won.
    WinnerB,
    /// The judges scored the match a tie.
    Tie,
}

/// Per-seat judging score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatScore {
    /// Seat the score belongs to.
    pub seat: Seat,
    /// The scored participant.
    pub user_id: Uuid,
    /// Aggregate score assigned by the judging pipeline.
    pub score: f64,
    /// Number of acceptance tests the submission passed.
    pub passed_tests: u32,
    /// Total number of acceptance tests.
    pub total_tests: u32,
}

/// Judging results, available once the match reaches `Judging` or later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResults {
    /// The judged match.
    pub match_id: Uuid,
    /// Declared winner or tie.
    pub outcome: MatchOutcome,
    /// One entry per occupied seat.
    pub scores: Vec<SeatScore>,
    /// When judging completed.
    pub judged_at_ms: i64,
}
