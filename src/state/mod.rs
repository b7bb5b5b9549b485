//! Shared per-match state: the projection, the phase machine, the dispute
//! board, and the watch channels the surrounding UI renders from.

pub mod dispute;
pub mod machine;
pub mod projection;

use std::sync::Arc;

use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{ClockReconciler, TimerDisplay};
use crate::config::SyncConfig;
use crate::dto::event::MatchStreamEvent;
use crate::dto::snapshot::{MatchSnapshot, ParticipantSnapshot};
use crate::error::ServiceError;
use crate::gateway::MatchGateway;
use crate::services::dispatcher::CommandDispatcher;
use crate::services::session_driver::SessionDriver;
use crate::state::machine::{MatchStateMachine, PhaseApplied};

pub use self::dispute::{Dispute, DisputeBoard};
pub use self::machine::{InvalidAction, MatchAction, MatchPhase};
pub use self::projection::{MatchMode, MatchProjection, Participant, Seat, SubmissionDraft};

/// Cheaply cloneable handle to one match's session state.
pub type SharedSession = Arc<MatchSession>;

/// Last command's confirmation state, published for display.
///
/// A command whose confirming update never arrives is `Unknown`, not failed
/// and not succeeded; the UI should offer a refresh affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// No command in flight.
    Idle,
    /// Command acknowledged; waiting for the confirming update.
    Pending(MatchAction),
    /// A confirming push event or refetch reflected the command.
    Confirmed(MatchAction),
    /// The confirmation bound elapsed without a confirming update.
    Unknown(MatchAction),
}

#[derive(Debug, Clone, Copy)]
struct PendingCommand {
    token: Uuid,
    action: MatchAction,
}

/// Central state for one match view.
///
/// Mutation happens only by applying inbound events or absorbing a refetch;
/// user commands go through the dispatcher, which proposes but never commits
/// a phase. Everything the UI renders is exposed as plain data: a projection
/// clone, a timer display, and watch channels.
pub struct MatchSession {
    match_id: Uuid,
    config: SyncConfig,
    projection: RwLock<MatchProjection>,
    machine: RwLock<MatchStateMachine>,
    disputes: RwLock<DisputeBoard>,
    clock: Mutex<ClockReconciler>,
    phase_tx: watch::Sender<MatchPhase>,
    timer_tx: watch::Sender<TimerDisplay>,
    outcome_tx: watch::Sender<CommandOutcome>,
    pending: Mutex<Option<PendingCommand>>,
}

impl MatchSession {
    /// Build a session from the first authoritative snapshot.
    pub fn new(snapshot: MatchSnapshot, config: SyncConfig) -> SharedSession {
        let machine = MatchStateMachine::new(snapshot.phase);
        let projection: MatchProjection = snapshot.into();
        let clock = ClockReconciler::new(&config);
        let initial_timer = clock.snapshot(
            projection.phase,
            projection.end_at,
            OffsetDateTime::now_utc(),
        );

        let (phase_tx, _) = watch::channel(projection.phase);
        let (timer_tx, _) = watch::channel(initial_timer);
        let (outcome_tx, _) = watch::channel(CommandOutcome::Idle);

        Arc::new(Self {
            match_id: projection.id,
            config,
            projection: RwLock::new(projection),
            machine: RwLock::new(machine),
            disputes: RwLock::new(DisputeBoard::new()),
            clock: Mutex::new(clock),
            phase_tx,
            timer_tx,
            outcome_tx,
            pending: Mutex::new(None),
        })
    }

    /// Identifier of the tracked match.
    pub fn match_id(&self) -> Uuid {
        self.match_id
    }

    /// Session configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Clone of the current read-only projection.
    pub async fn projection(&self) -> MatchProjection {
        self.projection.read().await.clone()
    }

    /// Last-known authoritative phase.
    pub async fn phase(&self) -> MatchPhase {
        self.machine.read().await.phase()
    }

    /// Subscribe to phase updates.
    pub fn phase_watch(&self) -> watch::Receiver<MatchPhase> {
        self.phase_tx.subscribe()
    }

    /// Subscribe to timer display updates.
    pub fn timer_watch(&self) -> watch::Receiver<TimerDisplay> {
        self.timer_tx.subscribe()
    }

    /// Subscribe to command outcome updates.
    pub fn outcome_watch(&self) -> watch::Receiver<CommandOutcome> {
        self.outcome_tx.subscribe()
    }

    /// Disputes filed against this match, in filing order.
    pub async fn disputes(&self) -> Vec<Dispute> {
        self.disputes.read().await.disputes().cloned().collect()
    }

    /// Whether the viewing user may still open a dispute per the service.
    pub async fn can_dispute(&self) -> bool {
        self.disputes.read().await.can_dispute()
    }

    pub(crate) fn dispute_board(&self) -> &RwLock<DisputeBoard> {
        &self.disputes
    }

    pub(crate) fn projection_handle(&self) -> &RwLock<MatchProjection> {
        &self.projection
    }

    /// Gate a dispatcher action by the last-known phase.
    pub(crate) async fn check_action(&self, action: MatchAction) -> Result<(), ServiceError> {
        self.machine.read().await.check(action)?;
        Ok(())
    }

    /// Apply one inbound push event, returning the phase afterwards.
    pub async fn apply_event(&self, event: MatchStreamEvent) -> MatchPhase {
        match event {
            MatchStreamEvent::PhaseChange { new_phase } => {
                self.apply_phase(new_phase).await;
            }
            MatchStreamEvent::TimerTick {
                remaining_ms,
                is_warning,
            } => {
                self.clock
                    .lock()
                    .await
                    .observe_server_tick(remaining_ms, is_warning);
                self.republish_timer().await;
            }
            MatchStreamEvent::Unknown => {
                debug!(match_id = %self.match_id, "ignoring unknown event type");
            }
        }
        self.phase().await
    }

    /// Absorb a full refetch, returning the phase afterwards.
    ///
    /// The snapshot's phase goes through the same monotonic application as a
    /// push event, so a stale fetch never regresses the machine.
    pub async fn apply_snapshot(&self, snapshot: MatchSnapshot) -> MatchPhase {
        let fetched_phase = snapshot.phase;
        // The viewer's row as the server reported it, captured before the
        // merge; the merged projection carries our own optimistic writes and
        // cannot serve as confirmation evidence.
        let my_row = {
            let projection = self.projection.read().await;
            let seat = snapshot.my_seat.or(projection.my_seat);
            seat.and_then(|seat| {
                snapshot
                    .participants
                    .iter()
                    .find(|row| row.seat == seat)
                    .cloned()
            })
        };
        {
            let mut projection = self.projection.write().await;
            projection.absorb(snapshot);
        }
        let phase = self.apply_phase(fetched_phase).await;
        self.confirm_pending_if_reflected(my_row.as_ref()).await;
        self.republish_timer().await;
        phase
    }

    async fn apply_phase(&self, new_phase: MatchPhase) -> MatchPhase {
        let applied = {
            let mut machine = self.machine.write().await;
            machine.apply_server_phase(new_phase)
        };

        match applied {
            PhaseApplied::Advanced { from } => {
                info!(
                    match_id = %self.match_id,
                    ?from,
                    to = ?new_phase,
                    "phase advanced"
                );
                {
                    let mut projection = self.projection.write().await;
                    projection.phase = new_phase;
                }
                // send_replace keeps the value current even while no
                // subscriber is attached yet.
                self.phase_tx.send_replace(new_phase);
                self.confirm_pending_for_phase(new_phase).await;
                self.republish_timer().await;
                new_phase
            }
            PhaseApplied::Duplicate => {
                debug!(match_id = %self.match_id, phase = ?new_phase, "duplicate phase event");
                new_phase
            }
            PhaseApplied::Backward { current } => {
                warn!(
                    match_id = %self.match_id,
                    ignored = ?new_phase,
                    ?current,
                    "ignoring backward phase event"
                );
                current
            }
        }
    }

    /// Recompute and publish the timer display for the current instant.
    pub async fn republish_timer(&self) {
        let (phase, end_at) = {
            let projection = self.projection.read().await;
            (projection.phase, projection.end_at)
        };
        let display = {
            let clock = self.clock.lock().await;
            clock.snapshot(phase, end_at, OffsetDateTime::now_utc())
        };
        self.timer_tx.send_replace(display);
    }

    /// Register a phase-bearing command awaiting its confirming update.
    pub(crate) async fn begin_confirmation(&self, action: MatchAction) -> Uuid {
        let token = Uuid::new_v4();
        {
            let mut pending = self.pending.lock().await;
            *pending = Some(PendingCommand { token, action });
        }
        self.outcome_tx.send_replace(CommandOutcome::Pending(action));
        token
    }

    /// Called when the confirmation bound elapses. A stale token (the command
    /// was confirmed meanwhile) is a no-op.
    pub(crate) async fn expire_confirmation(&self, token: Uuid) {
        let mut pending = self.pending.lock().await;
        let Some(command) = *pending else {
            return;
        };
        if command.token != token {
            return;
        }
        *pending = None;
        warn!(
            match_id = %self.match_id,
            action = ?command.action,
            "no confirming update within bound; outcome unknown"
        );
        self.outcome_tx
            .send_replace(CommandOutcome::Unknown(command.action));
    }

    /// Publish a terminal outcome for commands confirmed by their own
    /// acknowledgement (ready-up, submit).
    pub(crate) fn publish_outcome(&self, outcome: CommandOutcome) {
        self.outcome_tx.send_replace(outcome);
    }

    /// Whether reaching `phase` necessarily means the service accepted
    /// `action`. Only phase-bearing commands can be confirmed this way.
    fn phase_confirms(action: MatchAction, phase: MatchPhase) -> bool {
        match action {
            MatchAction::Lock => phase >= MatchPhase::SubmissionLocked,
            MatchAction::Forfeit => phase >= MatchPhase::Finalized,
            // Ready-up and submit confirm on their own acknowledgement;
            // dispute filing has no phase effect at all.
            MatchAction::ReadyUp | MatchAction::Submit | MatchAction::OpenDispute => false,
        }
    }

    /// Confirm the pending command when an advanced phase implies it was
    /// accepted. An unrelated phase event leaves the command pending.
    async fn confirm_pending_for_phase(&self, new_phase: MatchPhase) {
        let mut pending = self.pending.lock().await;
        let Some(command) = *pending else {
            return;
        };
        if !Self::phase_confirms(command.action, new_phase) {
            return;
        }
        *pending = None;
        self.outcome_tx
            .send_replace(CommandOutcome::Confirmed(command.action));
    }

    /// After a refetch, confirm the pending command if the server's own
    /// participant row reflects it.
    async fn confirm_pending_if_reflected(&self, row: Option<&ParticipantSnapshot>) {
        let Some(row) = row else {
            return;
        };
        let mut pending = self.pending.lock().await;
        let Some(command) = *pending else {
            return;
        };
        let reflected = match command.action {
            MatchAction::ReadyUp => row.ready_at_ms.is_some(),
            MatchAction::Submit => row.has_submitted,
            MatchAction::Lock => row.has_locked,
            MatchAction::Forfeit => row.forfeit_at_ms.is_some(),
            MatchAction::OpenDispute => false,
        };
        if !reflected {
            return;
        }
        *pending = None;
        self.outcome_tx
            .send_replace(CommandOutcome::Confirmed(command.action));
    }
}

/// One registered match session with its background driver.
struct SessionEntry {
    session: SharedSession,
    driver: SessionDriver,
}

/// Everything a match view needs, returned by [`SessionRegistry::attach`].
pub struct AttachedMatch {
    /// The shared session state.
    pub session: SharedSession,
    /// Dispatcher bound to this session and the registry's gateway.
    pub dispatcher: CommandDispatcher,
    /// Connection status updates for the status indicator.
    pub connection: watch::Receiver<crate::monitor::ConnectionStatus>,
}

/// Registry of active match sessions, one independent monitor per match.
///
/// The gateway is injected once here and passed down per session; nothing
/// reaches for a global API handle.
pub struct SessionRegistry {
    gateway: Arc<dyn MatchGateway>,
    config: SyncConfig,
    sessions: DashMap<Uuid, SessionEntry>,
}

impl SessionRegistry {
    /// Build a registry over the given gateway.
    pub fn new(gateway: Arc<dyn MatchGateway>, config: SyncConfig) -> Self {
        Self {
            gateway,
            config,
            sessions: DashMap::new(),
        }
    }

    /// Start (or re-use) a session for `match_id`: fetch the initial
    /// snapshot, spawn the driver, and hand back the view-facing handles.
    pub async fn attach(&self, match_id: Uuid) -> Result<AttachedMatch, ServiceError> {
        if let Some(entry) = self.sessions.get(&match_id) {
            return Ok(AttachedMatch {
                session: entry.session.clone(),
                dispatcher: CommandDispatcher::new(entry.session.clone(), self.gateway.clone()),
                connection: entry.driver.connection_watch(),
            });
        }

        let snapshot = self.gateway.fetch_match(match_id).await?;
        let session = MatchSession::new(snapshot, self.config.clone());
        let driver = SessionDriver::spawn(session.clone(), self.gateway.clone());
        let attached = AttachedMatch {
            session: session.clone(),
            dispatcher: CommandDispatcher::new(session.clone(), self.gateway.clone()),
            connection: driver.connection_watch(),
        };
        self.sessions
            .insert(match_id, SessionEntry { session, driver });
        Ok(attached)
    }

    /// Ask the session's monitor to retry after auto-reconnect gave up.
    pub fn retry_connection(&self, match_id: Uuid) {
        if let Some(entry) = self.sessions.get(&match_id) {
            entry.driver.retry_now();
        }
    }

    /// Tear a session down: stop the driver, cancel timers, release the
    /// subscription. Late events are discarded, not applied.
    pub fn detach(&self, match_id: Uuid) {
        if let Some((_, entry)) = self.sessions.remove(&match_id) {
            entry.driver.shutdown();
            info!(match_id = %match_id, "session detached");
        }
    }
}
