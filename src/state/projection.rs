//! The client's eventually-consistent copy of the server-owned match
//! document, with monotonic participant field application.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::dto::from_epoch_ms;
use crate::dto::snapshot::{MatchSnapshot, ParticipantSnapshot, SubmissionSnapshot};
use crate::state::machine::MatchPhase;

/// One of the two fixed participant slots of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    /// First slot, usually the challenger.
    A,
    /// Second slot.
    B,
}

/// How the match was arranged. Informational; does not affect the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Ladder match affecting rating.
    Ranked,
    /// Direct invitation between two users.
    Invite,
    /// Bracket match inside a tournament.
    Tournament,
}

/// One seat's occupant in the client projection.
///
/// `has_submitted` and `has_locked` are monotonic: once set they never revert
/// within the same match, and locking implies having submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    /// Platform user identifier.
    pub user_id: Uuid,
    /// Display name.
    pub username: String,
    /// Optional avatar URL.
    pub avatar_url: Option<String>,
    /// Slot this participant occupies.
    pub seat: Seat,
    /// When the participant joined. Immutable.
    pub joined_at: OffsetDateTime,
    /// When readiness was acknowledged during `Matched`. Set once.
    pub ready_at: Option<OffsetDateTime>,
    /// Whether a submission exists for this seat.
    pub has_submitted: bool,
    /// Whether the submission is locked.
    pub has_locked: bool,
    /// When this seat forfeited, if it did. Set once.
    pub forfeit_at: Option<OffsetDateTime>,
}

impl Participant {
    /// Merge a fresher server row into this participant, honoring the
    /// monotonic field rules. Identity fields are taken from the server.
    fn merge(&mut self, incoming: Participant) {
        self.username = incoming.username;
        self.avatar_url = incoming.avatar_url;
        if self.ready_at.is_none() {
            self.ready_at = incoming.ready_at;
        }
        self.has_submitted |= incoming.has_submitted;
        self.has_locked |= incoming.has_locked;
        if self.has_locked {
            self.has_submitted = true;
        }
        if self.forfeit_at.is_none() {
            self.forfeit_at = incoming.forfeit_at;
        }
    }
}

impl From<ParticipantSnapshot> for Participant {
    fn from(value: ParticipantSnapshot) -> Self {
        let has_locked = value.has_locked;
        Self {
            user_id: value.user_id,
            username: value.username,
            avatar_url: value.avatar_url,
            seat: value.seat,
            joined_at: from_epoch_ms(value.joined_at_ms),
            ready_at: value.ready_at_ms.map(from_epoch_ms),
            // Locking implies a submission even if the service row disagrees.
            has_submitted: value.has_submitted || has_locked,
            has_locked,
            forfeit_at: value.forfeit_at_ms.map(from_epoch_ms),
        }
    }
}

/// The viewing user's own submission. Never populated for the opponent.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionDraft {
    /// Opaque artifact reference.
    pub artifact: String,
    /// When it was last uploaded.
    pub submitted_at: OffsetDateTime,
    /// Whether it has been irreversibly locked.
    pub locked: bool,
}

impl From<SubmissionSnapshot> for SubmissionDraft {
    fn from(value: SubmissionSnapshot) -> Self {
        Self {
            artifact: value.artifact,
            submitted_at: from_epoch_ms(value.submitted_at_ms),
            locked: value.locked,
        }
    }
}

/// Read-only, eventually-consistent copy of the server-owned match document.
///
/// Mutated only by applying inbound events or absorbing a full refetch; the
/// phase field itself moves only through the session's state machine so a
/// stale fetch can never regress it.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchProjection {
    /// Match identifier.
    pub id: Uuid,
    /// Last-known authoritative phase.
    pub phase: MatchPhase,
    /// Matchmaking mode.
    pub mode: MatchMode,
    /// Absolute start timestamp, set when the match enters `InProgress`.
    pub start_at: Option<OffsetDateTime>,
    /// Absolute end timestamp; immutable once set.
    pub end_at: Option<OffsetDateTime>,
    /// Stake locked at creation.
    pub stake_amount: u64,
    /// Allowed match duration in milliseconds.
    pub time_limit_ms: u64,
    /// Occupant of seat A, when filled.
    pub seat_a: Option<Participant>,
    /// Occupant of seat B, when filled.
    pub seat_b: Option<Participant>,
    /// Seat occupied by the viewing user, when they participate.
    pub my_seat: Option<Seat>,
    /// The viewing user's own submission.
    pub my_submission: Option<SubmissionDraft>,
}

impl MatchProjection {
    /// Borrow the occupant of a seat.
    pub fn participant(&self, seat: Seat) -> Option<&Participant> {
        match seat {
            Seat::A => self.seat_a.as_ref(),
            Seat::B => self.seat_b.as_ref(),
        }
    }

    fn participant_mut(&mut self, seat: Seat) -> Option<&mut Participant> {
        match seat {
            Seat::A => self.seat_a.as_mut(),
            Seat::B => self.seat_b.as_mut(),
        }
    }

    /// The viewing user's participant row, when they occupy a seat.
    pub fn me(&self) -> Option<&Participant> {
        self.participant(self.my_seat?)
    }

    /// The opposing participant row, relative to the viewing user.
    pub fn opponent(&self) -> Option<&Participant> {
        let mine = self.my_seat?;
        let other = match mine {
            Seat::A => Seat::B,
            Seat::B => Seat::A,
        };
        self.participant(other)
    }

    /// Record a readiness acknowledgement for one seat. Set-once; a second
    /// call is a no-op.
    pub fn mark_ready(&mut self, seat: Seat, at: OffsetDateTime) {
        if let Some(participant) = self.participant_mut(seat)
            && participant.ready_at.is_none()
        {
            participant.ready_at = Some(at);
        }
    }

    /// Record that one seat has an (unlocked) submission.
    pub fn mark_submitted(&mut self, seat: Seat) {
        if let Some(participant) = self.participant_mut(seat) {
            participant.has_submitted = true;
        }
    }

    /// Record that one seat locked its submission. Implies submitted.
    pub fn mark_locked(&mut self, seat: Seat) {
        if let Some(participant) = self.participant_mut(seat) {
            participant.has_submitted = true;
            participant.has_locked = true;
        }
        if self.my_seat == Some(seat)
            && let Some(draft) = self.my_submission.as_mut()
        {
            draft.locked = true;
        }
    }

    /// Record a forfeit for one seat. Set-once.
    pub fn mark_forfeit(&mut self, seat: Seat, at: OffsetDateTime) {
        if let Some(participant) = self.participant_mut(seat)
            && participant.forfeit_at.is_none()
        {
            participant.forfeit_at = Some(at);
        }
    }

    /// Absorb a full refetch of the match document.
    ///
    /// Everything except the phase is replaced or merged from the snapshot;
    /// the phase is owned by the session's state machine, which applies it
    /// separately under the same monotonic rule as push events, so the value
    /// carried here is ignored.
    pub fn absorb(&mut self, snapshot: MatchSnapshot) {
        self.mode = snapshot.mode;
        if self.start_at.is_none() {
            self.start_at = snapshot.start_at_ms.map(from_epoch_ms);
        }
        // end_at is set once and immutable thereafter.
        if self.end_at.is_none() {
            self.end_at = snapshot.end_at_ms.map(from_epoch_ms);
        }
        self.my_seat = snapshot.my_seat.or(self.my_seat);
        if let Some(submission) = snapshot.my_submission {
            self.my_submission = Some(submission.into());
        }

        for row in snapshot.participants {
            let seat = row.seat;
            let incoming: Participant = row.into();
            match self.participant_mut(seat) {
                Some(existing) if existing.user_id == incoming.user_id => {
                    existing.merge(incoming);
                }
                _ => match seat {
                    Seat::A => self.seat_a = Some(incoming),
                    Seat::B => self.seat_b = Some(incoming),
                },
            }
        }
    }
}

impl From<MatchSnapshot> for MatchProjection {
    fn from(value: MatchSnapshot) -> Self {
        let mut seat_a = None;
        let mut seat_b = None;
        for row in value.participants {
            match row.seat {
                Seat::A => seat_a = Some(row.into()),
                Seat::B => seat_b = Some(row.into()),
            }
        }

        Self {
            id: value.id,
            phase: value.phase,
            mode: value.mode,
            start_at: value.start_at_ms.map(from_epoch_ms),
            end_at: value.end_at_ms.map(from_epoch_ms),
            stake_amount: value.stake_amount,
            time_limit_ms: value.time_limit_ms,
            seat_a,
            seat_b,
            my_seat: value.my_seat,
            my_submission: value.my_submission.map(Into::into),
        }
    }
}
