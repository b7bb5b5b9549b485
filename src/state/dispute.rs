//! Match-scoped dispute tracking with forward-only status application.

use indexmap::IndexMap;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::dto::dispute::{DisputeEvidence, DisputeList, DisputeResolution, DisputeSnapshot, DisputeStatus};
use crate::dto::from_epoch_ms;

/// One dispute tracked by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispute {
    /// Dispute identifier.
    pub id: Uuid,
    /// The finalized match this dispute is scoped to.
    pub match_id: Uuid,
    /// Participant who filed the dispute.
    pub opened_by: Uuid,
    /// The filed reason text.
    pub reason: String,
    /// Evidence attached at filing time.
    pub evidence: Option<DisputeEvidence>,
    /// Current lifecycle status.
    pub status: DisputeStatus,
    /// When the dispute was filed.
    pub opened_at: OffsetDateTime,
    /// Present only once the status is terminal.
    pub resolution: Option<DisputeResolution>,
}

impl From<DisputeSnapshot> for Dispute {
    fn from(value: DisputeSnapshot) -> Self {
        Self {
            id: value.id,
            match_id: value.match_id,
            opened_by: value.opened_by,
            reason: value.reason,
            evidence: value.evidence,
            status: value.status,
            opened_at: from_epoch_ms(value.opened_at_ms),
            resolution: value.resolution,
        }
    }
}

/// Match-scoped dispute collection with the one-active-dispute-per-user gate.
///
/// Status transitions are service-owned; the board only moves a dispute's
/// status forward (`Open → InReview → terminal`) and ignores anything that
/// would move it backward, mirroring how match phases are applied.
#[derive(Debug, Default)]
pub struct DisputeBoard {
    disputes: IndexMap<Uuid, Dispute>,
    can_dispute: bool,
}

impl DisputeBoard {
    /// Empty board; populated by the first list-disputes fetch.
    pub fn new() -> Self {
        Self {
            disputes: IndexMap::new(),
            can_dispute: true,
        }
    }

    /// Disputes in filing order.
    pub fn disputes(&self) -> impl Iterator<Item = &Dispute> {
        self.disputes.values()
    }

    /// Server-reported flag for whether the viewing user may still dispute.
    pub fn can_dispute(&self) -> bool {
        self.can_dispute
    }

    /// The user's open-or-in-review dispute, if any.
    pub fn active_dispute_by(&self, user_id: Uuid) -> Option<&Dispute> {
        self.disputes
            .values()
            .find(|dispute| dispute.opened_by == user_id && dispute.status.is_active())
    }

    /// Whether `user_id` already has an active dispute on this match.
    pub fn has_active(&self, user_id: Uuid) -> bool {
        self.active_dispute_by(user_id).is_some()
    }

    /// Replace the board contents from a list-disputes response, keeping the
    /// forward-only rule for disputes we already track.
    pub fn replace_from(&mut self, list: DisputeList) {
        self.can_dispute = list.can_dispute;
        for snapshot in list.disputes {
            self.upsert(snapshot.into());
        }
    }

    /// Insert a new dispute or advance the status of a tracked one.
    pub fn upsert(&mut self, incoming: Dispute) {
        match self.disputes.get_mut(&incoming.id) {
            Some(existing) => {
                if incoming.status.rank() < existing.status.rank() {
                    debug!(
                        dispute_id = %incoming.id,
                        current = ?existing.status,
                        incoming = ?incoming.status,
                        "ignoring backward dispute status"
                    );
                    return;
                }
                existing.status = incoming.status;
                if existing.resolution.is_none() {
                    existing.resolution = incoming.resolution;
                }
            }
            None => {
                self.disputes.insert(incoming.id, incoming);
            }
        }
    }
}
