//! Outbound command dispatch with local phase and precondition gating.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info};
use validator::Validate;

use crate::dto::dispute::OpenDisputeRequest;
use crate::dto::results::MatchResults;
use crate::error::ServiceError;
use crate::gateway::MatchGateway;
use crate::state::{
    CommandOutcome, Dispute, MatchAction, MatchPhase, SharedSession, SubmissionDraft,
};

/// Routes user intents through local gating to the gateway.
///
/// Every command is checked against the last-known phase and the viewer's own
/// projection row before anything touches the network, so locally-detectable
/// rejections cost nothing. The dispatcher proposes but never commits a phase:
/// what it writes back after a service acknowledgement are the viewer's own
/// monotonic fields, and the phase itself waits for the server's update.
#[derive(Clone)]
pub struct CommandDispatcher {
    session: SharedSession,
    gateway: Arc<dyn MatchGateway>,
}

impl CommandDispatcher {
    /// Bind a dispatcher to one session and its gateway.
    pub fn new(session: SharedSession, gateway: Arc<dyn MatchGateway>) -> Self {
        Self { session, gateway }
    }

    /// Acknowledge readiness during `Matched`.
    ///
    /// Idempotent: once the viewer's row is marked ready a repeat call is a
    /// local no-op and never reaches the service.
    pub async fn ready_up(&self) -> Result<(), ServiceError> {
        self.session.check_action(MatchAction::ReadyUp).await?;
        let seat = {
            let projection = self.session.projection_handle().read().await;
            let seat = projection.my_seat.ok_or(ServiceError::NotParticipant)?;
            if projection
                .me()
                .is_some_and(|me| me.ready_at.is_some())
            {
                debug!(match_id = %self.session.match_id(), "already ready; skipping");
                return Ok(());
            }
            seat
        };

        self.gateway.ready_up(self.session.match_id()).await?;

        {
            let mut projection = self.session.projection_handle().write().await;
            projection.mark_ready(seat, OffsetDateTime::now_utc());
        }
        self.session
            .publish_outcome(CommandOutcome::Confirmed(MatchAction::ReadyUp));
        info!(match_id = %self.session.match_id(), "readiness acknowledged");
        Ok(())
    }

    /// Upload (or overwrite) the viewer's submission while `InProgress`.
    ///
    /// Rejected locally once the submission is locked; a successful upload
    /// replaces the local draft and marks the viewer's row as submitted.
    pub async fn submit(&self, artifact: String) -> Result<(), ServiceError> {
        self.session.check_action(MatchAction::Submit).await?;
        let seat = {
            let projection = self.session.projection_handle().read().await;
            let seat = projection.my_seat.ok_or(ServiceError::NotParticipant)?;
            if projection.me().is_some_and(|me| me.has_locked) {
                return Err(ServiceError::InvalidState(
                    "submission is locked and can no longer change".into(),
                ));
            }
            seat
        };

        self.gateway
            .submit(self.session.match_id(), artifact.clone())
            .await?;

        {
            let mut projection = self.session.projection_handle().write().await;
            projection.my_submission = Some(SubmissionDraft {
                artifact,
                submitted_at: OffsetDateTime::now_utc(),
                locked: false,
            });
            projection.mark_submitted(seat);
        }
        self.session
            .publish_outcome(CommandOutcome::Confirmed(MatchAction::Submit));
        info!(match_id = %self.session.match_id(), "submission uploaded");
        Ok(())
    }

    /// Irreversibly lock the viewer's current submission.
    ///
    /// The acknowledgement alone does not prove the lock is in effect
    /// server-side for phase purposes, so the command stays `Pending` until a
    /// confirming update arrives or the confirmation bound elapses.
    pub async fn lock_submission(&self) -> Result<(), ServiceError> {
        self.session.check_action(MatchAction::Lock).await?;
        let seat = {
            let projection = self.session.projection_handle().read().await;
            let seat = projection.my_seat.ok_or(ServiceError::NotParticipant)?;
            let me = projection.me().ok_or(ServiceError::NotParticipant)?;
            if me.has_locked {
                return Err(ServiceError::InvalidState(
                    "submission is already locked".into(),
                ));
            }
            if !me.has_submitted {
                return Err(ServiceError::InvalidState(
                    "nothing submitted yet; upload before locking".into(),
                ));
            }
            seat
        };

        self.gateway
            .lock_submission(self.session.match_id())
            .await?;

        {
            let mut projection = self.session.projection_handle().write().await;
            projection.mark_locked(seat);
        }
        self.await_confirmation(MatchAction::Lock).await;
        info!(match_id = %self.session.match_id(), "submission locked");
        Ok(())
    }

    /// Concede the match.
    ///
    /// During `SubmissionLocked` and `Judging` a viewer whose submission is
    /// locked can no longer forfeit; the window closes for good once the
    /// match is finalized.
    pub async fn forfeit(&self) -> Result<(), ServiceError> {
        self.session.check_action(MatchAction::Forfeit).await?;
        let phase = self.session.phase().await;
        let seat = {
            let projection = self.session.projection_handle().read().await;
            let seat = projection.my_seat.ok_or(ServiceError::NotParticipant)?;
            let me = projection.me().ok_or(ServiceError::NotParticipant)?;
            if me.forfeit_at.is_some() {
                return Err(ServiceError::InvalidState(
                    "the match was already forfeited".into(),
                ));
            }
            if !matches!(phase, MatchPhase::InProgress) && me.has_locked {
                return Err(ServiceError::InvalidState(
                    "cannot forfeit after locking the submission".into(),
                ));
            }
            seat
        };

        self.gateway.forfeit(self.session.match_id()).await?;

        {
            let mut projection = self.session.projection_handle().write().await;
            projection.mark_forfeit(seat, OffsetDateTime::now_utc());
        }
        self.await_confirmation(MatchAction::Forfeit).await;
        info!(match_id = %self.session.match_id(), "forfeit submitted");
        Ok(())
    }

    /// File a dispute against the finalized result.
    ///
    /// Validation and the one-active-dispute-per-user gate run locally first;
    /// the service enforces the same gate and its rejection maps to the same
    /// error, so racing clients converge on one outcome.
    pub async fn open_dispute(
        &self,
        request: OpenDisputeRequest,
    ) -> Result<Dispute, ServiceError> {
        self.session.check_action(MatchAction::OpenDispute).await?;
        request.validate()?;

        let user_id = {
            let projection = self.session.projection_handle().read().await;
            projection
                .me()
                .map(|me| me.user_id)
                .ok_or(ServiceError::NotParticipant)?
        };
        {
            let board = self.session.dispute_board().read().await;
            if board.has_active(user_id) {
                return Err(ServiceError::DuplicateDispute);
            }
        }

        let snapshot = self
            .gateway
            .create_dispute(self.session.match_id(), request)
            .await?;
        let dispute: Dispute = snapshot.into();

        {
            let mut board = self.session.dispute_board().write().await;
            board.upsert(dispute.clone());
        }
        info!(
            match_id = %self.session.match_id(),
            dispute_id = %dispute.id,
            "dispute filed"
        );
        Ok(dispute)
    }

    /// Fetch judging results. Gated on the phase having reached judging.
    pub async fn fetch_results(&self) -> Result<MatchResults, ServiceError> {
        let phase = self.session.phase().await;
        if !phase.results_available() {
            return Err(ServiceError::InvalidState(format!(
                "results are not available while the match is {phase:?}"
            )));
        }
        let results = self.gateway.fetch_results(self.session.match_id()).await?;
        Ok(results)
    }

    /// Refetch the match document and absorb it into the session.
    pub async fn refresh(&self) -> Result<(), ServiceError> {
        let snapshot = self.gateway.fetch_match(self.session.match_id()).await?;
        self.session.apply_snapshot(snapshot).await;
        Ok(())
    }

    /// Refetch the dispute list and absorb it into the board.
    pub async fn refresh_disputes(&self) -> Result<Vec<Dispute>, ServiceError> {
        let list = self.gateway.list_disputes(self.session.match_id()).await?;
        {
            let mut board = self.session.dispute_board().write().await;
            board.replace_from(list);
        }
        Ok(self.session.disputes().await)
    }

    /// Register a pending confirmation and arm its expiry timer.
    async fn await_confirmation(&self, action: MatchAction) {
        let token = self.session.begin_confirmation(action).await;
        let session = self.session.clone();
        let bound = self.session.config().confirmation_bound;
        tokio::spawn(async move {
            tokio::time::sleep(bound).await;
            session.expire_confirmation(token).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use futures::FutureExt;
    use futures::future::BoxFuture;
    use uuid::Uuid;

    use crate::clock::TimerDisplay;
    use crate::config::SyncConfig;
    use crate::dto::dispute::{DisputeList, DisputeSnapshot, DisputeStatus};
    use crate::dto::event::MatchStreamEvent;
    use crate::dto::results::{MatchOutcome, MatchResults, SeatScore};
    use crate::dto::snapshot::{MatchSnapshot, ParticipantSnapshot};
    use crate::gateway::{EventStream, GatewayError, GatewayResult};
    use crate::state::{MatchMode, MatchPhase, MatchSession, Seat};

    #[derive(Default)]
    struct RecordingGateway {
        ready_calls: AtomicU32,
        submit_calls: AtomicU32,
        lock_calls: AtomicU32,
        forfeit_calls: AtomicU32,
        dispute_calls: AtomicU32,
        results_calls: AtomicU32,
        reject_with: std::sync::Mutex<Option<GatewayError>>,
    }

    impl RecordingGateway {
        fn rejecting(err: GatewayError) -> Self {
            Self {
                reject_with: std::sync::Mutex::new(Some(err)),
                ..Self::default()
            }
        }

        fn ack_or_reject(&self) -> BoxFuture<'static, GatewayResult<()>> {
            let rejection = self.reject_with.lock().unwrap().take();
            async move {
                match rejection {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
            .boxed()
        }
    }

    impl MatchGateway for RecordingGateway {
        fn fetch_match(&self, _: Uuid) -> BoxFuture<'static, GatewayResult<MatchSnapshot>> {
            unimplemented!("not exercised by these tests")
        }

        fn fetch_results(&self, match_id: Uuid) -> BoxFuture<'static, GatewayResult<MatchResults>> {
            self.results_calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(MatchResults {
                    match_id,
                    outcome: MatchOutcome::WinnerA,
                    scores: vec![
                        SeatScore {
                            seat: Seat::A,
                            user_id: Uuid::new_v4(),
                            score: 87.5,
                            passed_tests: 7,
                            total_tests: 8,
                        },
                        SeatScore {
                            seat: Seat::B,
                            user_id: Uuid::new_v4(),
                            score: 62.5,
                            passed_tests: 5,
                            total_tests: 8,
                        },
                    ],
                    judged_at_ms: 1_700_000_550_000,
                })
            }
            .boxed()
        }

        fn subscribe(&self, _: Uuid) -> BoxFuture<'static, GatewayResult<EventStream>> {
            unimplemented!("not exercised by these tests")
        }

        fn ready_up(&self, _: Uuid) -> BoxFuture<'static, GatewayResult<()>> {
            self.ready_calls.fetch_add(1, Ordering::SeqCst);
            self.ack_or_reject()
        }

        fn submit(&self, _: Uuid, _: String) -> BoxFuture<'static, GatewayResult<()>> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            self.ack_or_reject()
        }

        fn lock_submission(&self, _: Uuid) -> BoxFuture<'static, GatewayResult<()>> {
            self.lock_calls.fetch_add(1, Ordering::SeqCst);
            self.ack_or_reject()
        }

        fn forfeit(&self, _: Uuid) -> BoxFuture<'static, GatewayResult<()>> {
            self.forfeit_calls.fetch_add(1, Ordering::SeqCst);
            self.ack_or_reject()
        }

        fn create_dispute(
            &self,
            match_id: Uuid,
            request: OpenDisputeRequest,
        ) -> BoxFuture<'static, GatewayResult<DisputeSnapshot>> {
            self.dispute_calls.fetch_add(1, Ordering::SeqCst);
            let rejection = self.reject_with.lock().unwrap().take();
            async move {
                if let Some(err) = rejection {
                    return Err(err);
                }
                Ok(DisputeSnapshot {
                    id: Uuid::new_v4(),
                    match_id,
                    opened_by: Uuid::new_v4(),
                    reason: request.reason,
                    evidence: request.evidence,
                    status: DisputeStatus::Open,
                    opened_at_ms: 1_700_000_000_000,
                    resolution: None,
                })
            }
            .boxed()
        }

        fn list_disputes(&self, _: Uuid) -> BoxFuture<'static, GatewayResult<DisputeList>> {
            async move {
                Ok(DisputeList {
                    disputes: Vec::new(),
                    can_dispute: true,
                })
            }
            .boxed()
        }
    }

    fn participant_row(seat: Seat) -> ParticipantSnapshot {
        ParticipantSnapshot {
            user_id: Uuid::new_v4(),
            username: format!("player-{seat:?}"),
            avatar_url: None,
            seat,
            joined_at_ms: 1_700_000_000_000,
            ready_at_ms: None,
            has_submitted: false,
            has_locked: false,
            forfeit_at_ms: None,
        }
    }

    fn snapshot(phase: MatchPhase) -> MatchSnapshot {
        MatchSnapshot {
            id: Uuid::new_v4(),
            phase,
            mode: MatchMode::Ranked,
            start_at_ms: None,
            end_at_ms: None,
            stake_amount: 500,
            time_limit_ms: 3_600_000,
            participants: vec![participant_row(Seat::A), participant_row(Seat::B)],
            my_seat: Some(Seat::A),
            my_submission: None,
        }
    }

    fn fixture(phase: MatchPhase) -> (CommandDispatcher, SharedSession, Arc<RecordingGateway>) {
        fixture_with(snapshot(phase), RecordingGateway::default())
    }

    fn fixture_with(
        snapshot: MatchSnapshot,
        gateway: RecordingGateway,
    ) -> (CommandDispatcher, SharedSession, Arc<RecordingGateway>) {
        let gateway = Arc::new(gateway);
        let session = MatchSession::new(snapshot, SyncConfig::default());
        let dispatcher = CommandDispatcher::new(session.clone(), gateway.clone());
        (dispatcher, session, gateway)
    }

    fn dispute_request() -> OpenDisputeRequest {
        OpenDisputeRequest {
            reason: "the judge scored seat B's artifact under my seat".into(),
            evidence: None,
        }
    }

    #[tokio::test]
    async fn ready_up_marks_me_without_advancing_phase() {
        let (dispatcher, session, gateway) = fixture(MatchPhase::Matched);

        dispatcher.ready_up().await.unwrap();

        let projection = session.projection().await;
        assert!(projection.me().unwrap().ready_at.is_some());
        assert!(projection.opponent().unwrap().ready_at.is_none());
        assert_eq!(session.phase().await, MatchPhase::Matched);
        assert_eq!(gateway.ready_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *session.outcome_watch().borrow(),
            CommandOutcome::Confirmed(MatchAction::ReadyUp)
        );
    }

    #[tokio::test]
    async fn repeated_ready_up_skips_the_network() {
        let (dispatcher, _session, gateway) = fixture(MatchPhase::Matched);

        dispatcher.ready_up().await.unwrap();
        dispatcher.ready_up().await.unwrap();

        assert_eq!(gateway.ready_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ready_up_outside_matched_never_hits_network() {
        let (dispatcher, _session, gateway) = fixture(MatchPhase::InProgress);

        let err = dispatcher.ready_up().await.unwrap_err();
        assert!(matches!(err, ServiceError::IllegalAction(_)));
        assert_eq!(gateway.ready_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn spectator_cannot_ready_up() {
        let mut doc = snapshot(MatchPhase::Matched);
        doc.my_seat = None;
        let (dispatcher, _session, gateway) = fixture_with(doc, RecordingGateway::default());

        let err = dispatcher.ready_up().await.unwrap_err();
        assert!(matches!(err, ServiceError::NotParticipant));
        assert_eq!(gateway.ready_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn submit_after_lock_is_rejected_locally() {
        let mut doc = snapshot(MatchPhase::InProgress);
        doc.participants[0].has_submitted = true;
        doc.participants[0].has_locked = true;
        let (dispatcher, _session, gateway) = fixture_with(doc, RecordingGateway::default());

        let err = dispatcher.submit("solution-v2".into()).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(gateway.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn submit_overwrites_the_local_draft() {
        let (dispatcher, session, gateway) = fixture(MatchPhase::InProgress);

        dispatcher.submit("solution-v1".into()).await.unwrap();
        dispatcher.submit("solution-v2".into()).await.unwrap();

        let projection = session.projection().await;
        assert_eq!(
            projection.my_submission.as_ref().unwrap().artifact,
            "solution-v2"
        );
        assert!(projection.me().unwrap().has_submitted);
        assert_eq!(gateway.submit_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn lock_requires_a_submission() {
        let (dispatcher, _session, gateway) = fixture(MatchPhase::InProgress);

        let err = dispatcher.lock_submission().await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(gateway.lock_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lock_outcome_unknown_after_the_bound() {
        let (dispatcher, session, _gateway) = fixture(MatchPhase::InProgress);
        dispatcher.submit("solution".into()).await.unwrap();
        dispatcher.lock_submission().await.unwrap();

        assert_eq!(
            *session.outcome_watch().borrow(),
            CommandOutcome::Pending(MatchAction::Lock)
        );

        // Let the spawned expiry task register its sleep before the jump.
        tokio::task::yield_now().await;
        tokio::time::advance(session.config().confirmation_bound + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        assert_eq!(
            *session.outcome_watch().borrow(),
            CommandOutcome::Unknown(MatchAction::Lock)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn lock_confirmed_by_phase_event() {
        let (dispatcher, session, _gateway) = fixture(MatchPhase::InProgress);
        dispatcher.submit("solution".into()).await.unwrap();
        dispatcher.lock_submission().await.unwrap();

        session
            .apply_event(MatchStreamEvent::PhaseChange {
                new_phase: MatchPhase::SubmissionLocked,
            })
            .await;

        assert_eq!(
            *session.outcome_watch().borrow(),
            CommandOutcome::Confirmed(MatchAction::Lock)
        );

        // The expiry timer finds its token already cleared.
        tokio::time::advance(session.config().confirmation_bound + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        assert_eq!(
            *session.outcome_watch().borrow(),
            CommandOutcome::Confirmed(MatchAction::Lock)
        );
    }

    #[tokio::test]
    async fn watches_subscribed_late_read_latest_values() {
        let (dispatcher, session, _gateway) = fixture(MatchPhase::Matched);
        dispatcher.ready_up().await.unwrap();
        session
            .apply_event(MatchStreamEvent::PhaseChange {
                new_phase: MatchPhase::InProgress,
            })
            .await;

        // No receiver existed while any of that ran; subscribers attaching
        // only now still read the latest published values.
        assert_eq!(*session.phase_watch().borrow(), MatchPhase::InProgress);
        assert_eq!(
            *session.outcome_watch().borrow(),
            CommandOutcome::Confirmed(MatchAction::ReadyUp)
        );
        assert!(!matches!(
            *session.timer_watch().borrow(),
            TimerDisplay::WaitingToStart
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unrelated_phase_event_leaves_forfeit_pending() {
        let (dispatcher, session, _gateway) = fixture(MatchPhase::InProgress);
        dispatcher.forfeit().await.unwrap();
        assert_eq!(
            *session.outcome_watch().borrow(),
            CommandOutcome::Pending(MatchAction::Forfeit)
        );

        // An opponent-driven lock transition says nothing about the forfeit.
        session
            .apply_event(MatchStreamEvent::PhaseChange {
                new_phase: MatchPhase::SubmissionLocked,
            })
            .await;
        assert_eq!(
            *session.outcome_watch().borrow(),
            CommandOutcome::Pending(MatchAction::Forfeit)
        );

        // Finalization is what a forfeit drives the match toward.
        session
            .apply_event(MatchStreamEvent::PhaseChange {
                new_phase: MatchPhase::Finalized,
            })
            .await;
        assert_eq!(
            *session.outcome_watch().borrow(),
            CommandOutcome::Confirmed(MatchAction::Forfeit)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_refetch_leaves_lock_pending() {
        let (dispatcher, session, _gateway) = fixture(MatchPhase::InProgress);
        dispatcher.submit("solution".into()).await.unwrap();
        dispatcher.lock_submission().await.unwrap();

        // A refetch that does not carry the lock yet must not confirm it,
        // even though the merged projection already shows our optimistic
        // write.
        let projection = session.projection().await;
        let mut doc = snapshot(MatchPhase::InProgress);
        doc.id = projection.id;
        for row in &mut doc.participants {
            row.user_id = projection.participant(row.seat).unwrap().user_id;
        }
        doc.participants[0].has_submitted = true;
        session.apply_snapshot(doc.clone()).await;
        assert_eq!(
            *session.outcome_watch().borrow(),
            CommandOutcome::Pending(MatchAction::Lock)
        );

        // Once the server's own row reflects the lock, it confirms.
        doc.participants[0].has_locked = true;
        session.apply_snapshot(doc).await;
        assert_eq!(
            *session.outcome_watch().borrow(),
            CommandOutcome::Confirmed(MatchAction::Lock)
        );
    }

    #[tokio::test]
    async fn forfeit_after_lock_rejected_once_locked_phase() {
        let mut doc = snapshot(MatchPhase::SubmissionLocked);
        doc.participants[0].has_submitted = true;
        doc.participants[0].has_locked = true;
        let (dispatcher, _session, gateway) = fixture_with(doc, RecordingGateway::default());

        let err = dispatcher.forfeit().await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(gateway.forfeit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn forfeit_during_in_progress_allowed_even_when_locked() {
        let mut doc = snapshot(MatchPhase::InProgress);
        doc.participants[0].has_submitted = true;
        doc.participants[0].has_locked = true;
        let (dispatcher, session, gateway) = fixture_with(doc, RecordingGateway::default());

        dispatcher.forfeit().await.unwrap();

        assert!(session.projection().await.me().unwrap().forfeit_at.is_some());
        assert_eq!(gateway.forfeit_calls.load(Ordering::SeqCst), 1);
        // The phase still waits for the server.
        assert_eq!(session.phase().await, MatchPhase::InProgress);
    }

    #[tokio::test]
    async fn forfeit_in_finalized_is_illegal() {
        let (dispatcher, _session, gateway) = fixture(MatchPhase::Finalized);

        let err = dispatcher.forfeit().await.unwrap_err();
        assert!(matches!(err, ServiceError::IllegalAction(_)));
        assert_eq!(gateway.forfeit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_dispute_reason_rejected_before_network() {
        let (dispatcher, _session, gateway) = fixture(MatchPhase::Finalized);

        let err = dispatcher
            .open_dispute(OpenDisputeRequest {
                reason: "unfair".into(),
                evidence: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert_eq!(gateway.dispute_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dispute_outside_finalized_is_illegal() {
        let (dispatcher, _session, gateway) = fixture(MatchPhase::InProgress);

        let err = dispatcher.open_dispute(dispute_request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::IllegalAction(_)));
        assert_eq!(gateway.dispute_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn second_active_dispute_rejected_locally() {
        let (dispatcher, session, gateway) = fixture(MatchPhase::Finalized);

        let filed = dispatcher.open_dispute(dispute_request()).await.unwrap();
        // Make the tracked dispute belong to the viewing user, as the
        // service would report it.
        let me = session.projection().await.me().unwrap().user_id;
        {
            let mut board = session.dispute_board().write().await;
            board.upsert(Dispute {
                id: Uuid::new_v4(),
                opened_by: me,
                ..filed
            });
        }

        let err = dispatcher.open_dispute(dispute_request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateDispute));
        assert_eq!(gateway.dispute_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remote_duplicate_rejection_maps_to_the_same_error() {
        let (dispatcher, _session, gateway) = fixture_with(
            snapshot(MatchPhase::Finalized),
            RecordingGateway::rejecting(GatewayError::DuplicateDispute),
        );

        let err = dispatcher.open_dispute(dispute_request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateDispute));
        assert_eq!(gateway.dispute_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn results_gated_until_judging() {
        let (dispatcher, _session, gateway) = fixture(MatchPhase::InProgress);
        let err = dispatcher.fetch_results().await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(gateway.results_calls.load(Ordering::SeqCst), 0);

        let (dispatcher, _session, gateway) = fixture(MatchPhase::Judging);
        let results = dispatcher.fetch_results().await.unwrap();
        assert_eq!(results.outcome, MatchOutcome::WinnerA);
        assert_eq!(gateway.results_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remote_conflict_surfaces_verbatim() {
        let mut doc = snapshot(MatchPhase::InProgress);
        doc.participants[0].has_submitted = true;
        let (dispatcher, _session, _gateway) = fixture_with(
            doc,
            RecordingGateway::rejecting(GatewayError::Conflict(
                "submission already locked".into(),
            )),
        );

        let err = dispatcher.lock_submission().await.unwrap_err();
        assert_eq!(err.to_string(), "conflict: submission already locked");
    }
}
