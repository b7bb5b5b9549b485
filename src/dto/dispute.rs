//! Dispute request and response shapes, including filing validation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::dto::validation::validate_evidence_links;

/// Minimum length of the free-text dispute reason.
pub const MIN_REASON_CHARS: u64 = 10;

/// Client-initiated request to open a dispute against a finalized match.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OpenDisputeRequest {
    /// Free-text explanation of what is being contested.
    #[validate(length(min = 10, message = "Dispute reason must be at least 10 characters"))]
    pub reason: String,
    /// Optional structured evidence backing the dispute.
    #[validate(nested)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<DisputeEvidence>,
}

/// Structured evidence attached to a dispute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DisputeEvidence {
    /// Short summary of the evidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Links to supporting material (CI runs, recordings, ...).
    #[validate(custom(function = "validate_evidence_links"))]
    #[serde(default)]
    pub links: Vec<String>,
    /// Free-text context for the reviewer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Lifecycle status of a dispute as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    /// Filed, awaiting triage.
    Open,
    /// Picked up by a moderator.
    InReview,
    /// Closed with a decision. Terminal.
    Resolved,
    /// Closed without a decision. Terminal.
    Dismissed,
}

impl DisputeStatus {
    /// Whether this dispute still blocks the opener from filing another one.
    pub fn is_active(self) -> bool {
        matches!(self, DisputeStatus::Open | DisputeStatus::InReview)
    }

    /// Position along the forward-only dispute lifecycle.
    pub(crate) fn rank(self) -> u8 {
        match self {
            DisputeStatus::Open => 0,
            DisputeStatus::InReview => 1,
            DisputeStatus::Resolved | DisputeStatus::Dismissed => 2,
        }
    }
}

/// Moderator decision on a resolved dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeDecision {
    /// The dispute had merit.
    Upheld,
    /// The dispute was without merit.
    Rejected,
    /// Partially upheld.
    Partial,
}

/// Directive applied to the match when a dispute closes.
///
/// Anything other than `NoChange` is the only path by which a finalized
/// match's declared winner can retroactively change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeDirective {
    /// The original result stands.
    NoChange,
    /// Seat A is declared the winner.
    WinnerA,
    /// Seat B is declared the winner.
    WinnerB,
    /// The match is re-declared a tie.
    Tie,
}

/// Terminal resolution attached to a resolved or dismissed dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeResolution {
    /// The moderator's decision.
    pub decision: DisputeDecision,
    /// What happens to the match result.
    pub new_outcome: OutcomeDirective,
}

/// One dispute as reported by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeSnapshot {
    /// Dispute identifier.
    pub id: Uuid,
    /// The finalized match this dispute is scoped to.
    pub match_id: Uuid,
    /// Participant who filed the dispute.
    pub opened_by: Uuid,
    /// The filed reason text.
    pub reason: String,
    /// Evidence attached at filing time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<DisputeEvidence>,
    /// Current lifecycle status.
    pub status: DisputeStatus,
    /// When the dispute was filed.
    pub opened_at_ms: i64,
    /// Present only once the status is terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<DisputeResolution>,
}

/// Response of the list-disputes endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeList {
    /// Disputes filed against the match, in filing order.
    pub disputes: Vec<DisputeSnapshot>,
    /// Whether the viewing user may still open a dispute.
    pub can_dispute: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_reason_fails_validation() {
        let request = OpenDisputeRequest {
            reason: "too short".into(),
            evidence: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn ten_character_reason_passes() {
        let request = OpenDisputeRequest {
            reason: "0123456789".into(),
            evidence: None,
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn malformed_evidence_link_fails_validation() {
        let request = OpenDisputeRequest {
            reason: "judge scored the wrong artifact".into(),
            evidence: Some(DisputeEvidence {
                description: None,
                links: vec!["not a url".into()],
                context: None,
            }),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn active_statuses() {
        assert!(DisputeStatus::Open.is_active());
        assert!(DisputeStatus::InReview.is_active());
        assert!(!DisputeStatus::Resolved.is_active());
        assert!(!DisputeStatus::Dismissed.is_active());
    }
}
