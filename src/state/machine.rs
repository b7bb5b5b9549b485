//! The canonical match phase model: ordering, server-driven application, and
//! the per-phase legal action table.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discrete phases a match can be in, ordered along the lifecycle pipeline.
///
/// The derived [`Ord`] follows the forward progression of a match; there are
/// no backward transitions. `Open`, `Matched` and `InProgress` may jump
/// directly to `Finalized` when a participant forfeits or the match times
/// out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// The match document exists but is not yet visible to challengers.
    Created,
    /// The match is listed and waiting for a second participant.
    Open,
    /// Both seats are filled; participants acknowledge readiness.
    Matched,
    /// The clock is running and submissions are accepted.
    InProgress,
    /// Both submissions are locked; no further participant work accepted.
    SubmissionLocked,
    /// The judging pipeline is evaluating the locked submissions.
    Judging,
    /// Results are declared; disputes may be opened.
    Finalized,
    /// The match is closed for good, including disputes.
    Archived,
}

impl MatchPhase {
    /// Whether the push subscription should be running for this phase.
    ///
    /// Outside the live set the monitor is torn down entirely to avoid idle
    /// connections.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            MatchPhase::Matched
                | MatchPhase::InProgress
                | MatchPhase::SubmissionLocked
                | MatchPhase::Judging
        )
    }

    /// Whether the competitive part of the match is over.
    pub fn has_ended(self) -> bool {
        matches!(self, MatchPhase::Finalized | MatchPhase::Archived)
    }

    /// Whether results are available for retrieval.
    pub fn results_available(self) -> bool {
        matches!(
            self,
            MatchPhase::Judging | MatchPhase::Finalized | MatchPhase::Archived
        )
    }
}

/// User intents the dispatcher can emit, gated by the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchAction {
    /// Acknowledge readiness while the match is `Matched`.
    ReadyUp,
    /// Upload (or overwrite) the unlocked submission.
    Submit,
    /// Irreversibly lock the current submission.
    Lock,
    /// Concede the match.
    Forfeit,
    /// Open a dispute against a finalized result.
    OpenDispute,
}

/// Error returned when an action is attempted outside its legal phase set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{action:?} is not allowed while the match is {phase:?}")]
pub struct InvalidAction {
    /// Phase the match was in when the action was attempted.
    pub phase: MatchPhase,
    /// The rejected action.
    pub action: MatchAction,
}

/// Result of applying a server-pushed phase to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseApplied {
    /// The phase moved forward.
    Advanced {
        /// Phase before the event was applied.
        from: MatchPhase,
    },
    /// The event carried the phase we are already in; applying it is a no-op.
    Duplicate,
    /// The event carried an earlier phase and was ignored.
    Backward {
        /// Phase the machine stayed in.
        current: MatchPhase,
    },
}

/// Canonical phase model of one match.
///
/// The machine only ever moves forward, and only on server authority: the
/// client proposes actions through the dispatcher but never advances the
/// phase on its own initiative. Duplicate and out-of-order deliveries from
/// the push channel are tolerated by treating phase assignment as idempotent
/// and ignoring backward events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchStateMachine {
    phase: MatchPhase,
}

impl MatchStateMachine {
    /// Create a machine starting at the given phase (taken from the first
    /// authoritative snapshot, not assumed).
    pub fn new(phase: MatchPhase) -> Self {
        Self { phase }
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Apply an authoritative phase pushed by the server.
    ///
    /// Any forward move is accepted: the pipeline is linear (plus the forced
    /// shortcut to `Finalized`), so a jump over intermediate phases is the
    /// composition of legal transitions, which happens when events were
    /// missed during a reconnect.
    pub fn apply_server_phase(&mut self, new_phase: MatchPhase) -> PhaseApplied {
        match new_phase.cmp(&self.phase) {
            std::cmp::Ordering::Equal => PhaseApplied::Duplicate,
            std::cmp::Ordering::Less => PhaseApplied::Backward {
                current: self.phase,
            },
            std::cmp::Ordering::Greater => {
                let from = self.phase;
                self.phase = new_phase;
                PhaseApplied::Advanced { from }
            }
        }
    }

    /// Check whether `action` is legal in the current phase.
    ///
    /// This covers the phase gate only; participant-level conditions (ready
    /// idempotence, the lock-forbids-forfeit rule) are checked against the
    /// projection by the dispatcher.
    pub fn allows(&self, action: MatchAction) -> bool {
        Self::phase_allows(self.phase, action)
    }

    /// Like [`allows`](Self::allows) but returning the specific error.
    pub fn check(&self, action: MatchAction) -> Result<(), InvalidAction> {
        if self.allows(action) {
            Ok(())
        } else {
            Err(InvalidAction {
                phase: self.phase,
                action,
            })
        }
    }

    /// The per-phase legal action table.
    pub fn phase_allows(phase: MatchPhase, action: MatchAction) -> bool {
        match phase {
            MatchPhase::Created | MatchPhase::Open | MatchPhase::Archived => false,
            MatchPhase::Matched => matches!(action, MatchAction::ReadyUp),
            MatchPhase::InProgress => matches!(
                action,
                MatchAction::Submit | MatchAction::Lock | MatchAction::Forfeit
            ),
            MatchPhase::SubmissionLocked | MatchPhase::Judging => {
                matches!(action, MatchAction::Forfeit)
            }
            MatchPhase::Finalized => matches!(action, MatchAction::OpenDispute),
        }
    }
}
