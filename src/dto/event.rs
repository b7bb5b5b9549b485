//! Push event payloads delivered over a match subscription.

use serde::{Deserialize, Serialize};

use crate::state::machine::MatchPhase;

/// One inbound event on a match's push subscription.
///
/// The wire discriminates on a `type` string; unrecognised types land on the
/// explicit [`Unknown`](MatchStreamEvent::Unknown) arm so a newer server can
/// add event kinds without breaking older clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchStreamEvent {
    /// The match moved to a new authoritative phase.
    PhaseChange {
        /// Phase the match is now in.
        new_phase: MatchPhase,
    },
    /// Periodic authoritative countdown value.
    TimerTick {
        /// Remaining match time in milliseconds.
        remaining_ms: u64,
        /// Server-side urgency flag; overrides local classification.
        is_warning: bool,
    },
    /// Any event type this client does not understand. Ignored, never fatal.
    #[serde(other)]
    Unknown,
}
