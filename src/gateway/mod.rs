//! Contract with the remote arena service: request/response fetches, command
//! endpoints, and the per-match push subscription.

#[cfg(feature = "http-gateway")]
pub mod http;

use std::error::Error;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use thiserror::Error;
use uuid::Uuid;

use crate::dto::dispute::{DisputeList, DisputeSnapshot, OpenDisputeRequest};
use crate::dto::event::MatchStreamEvent;
use crate::dto::results::MatchResults;
use crate::dto::snapshot::MatchSnapshot;

/// Result alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Ordered stream of push events for one match. Ends when the connection
/// drops; the monitor decides whether to resubscribe.
pub type EventStream = BoxStream<'static, MatchStreamEvent>;

/// Error raised by a gateway regardless of the underlying transport.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The service could not be reached or the connection broke.
    #[error("transport failure: {message}")]
    Transport {
        /// Human-readable summary of what failed.
        message: String,
        /// Underlying transport error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The command conflicts with the match's current server-side state.
    #[error("{0}")]
    Conflict(String),
    /// The acting user already has an active dispute on this match.
    #[error("an active dispute already exists for this match")]
    DuplicateDispute,
    /// The referenced match or resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The service refused the request for another stated reason.
    #[error("{0}")]
    Rejected(String),
}

impl GatewayError {
    /// Construct a transport error from any underlying failure.
    pub fn transport(message: impl Into<String>, source: impl Error + Send + Sync + 'static) -> Self {
        GatewayError::Transport {
            message: message.into(),
            source: Box::new(source),
        }
    }
}

/// Abstraction over the remote arena service.
///
/// Injected per match-view instance rather than acquired through a global
/// handle, so sessions never share hidden coupling. All operations act on
/// behalf of the authenticated user carried by the implementation.
pub trait MatchGateway: Send + Sync {
    /// Fetch the full match document.
    fn fetch_match(&self, match_id: Uuid) -> BoxFuture<'static, GatewayResult<MatchSnapshot>>;
    /// Fetch judging results; only available once the match reaches judging.
    fn fetch_results(&self, match_id: Uuid) -> BoxFuture<'static, GatewayResult<MatchResults>>;
    /// Open the push subscription for a match.
    fn subscribe(&self, match_id: Uuid) -> BoxFuture<'static, GatewayResult<EventStream>>;
    /// Acknowledge readiness during `Matched`.
    fn ready_up(&self, match_id: Uuid) -> BoxFuture<'static, GatewayResult<()>>;
    /// Upload or overwrite the unlocked submission.
    fn submit(&self, match_id: Uuid, artifact: String) -> BoxFuture<'static, GatewayResult<()>>;
    /// Irreversibly lock the current submission.
    fn lock_submission(&self, match_id: Uuid) -> BoxFuture<'static, GatewayResult<()>>;
    /// Concede the match.
    fn forfeit(&self, match_id: Uuid) -> BoxFuture<'static, GatewayResult<()>>;
    /// File a dispute against a finalized match.
    fn create_dispute(
        &self,
        match_id: Uuid,
        request: OpenDisputeRequest,
    ) -> BoxFuture<'static, GatewayResult<DisputeSnapshot>>;
    /// List disputes filed against a match.
    fn list_disputes(&self, match_id: Uuid) -> BoxFuture<'static, GatewayResult<DisputeList>>;
}
