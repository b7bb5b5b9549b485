//! Background tasks driving one session: event application, the local clock
//! tick, and the periodic backing refetch.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

use crate::dto::event::MatchStreamEvent;
use crate::gateway::MatchGateway;
use crate::monitor::{ConnectionMonitor, ConnectionState, ConnectionStatus};
use crate::state::{MatchPhase, SharedSession};

/// Background machinery for one session: the event application loop, the
/// 1 Hz local clock tick, and the periodic full refetch.
///
/// All projection mutation funnels through the single event-application task,
/// so no two writers ever race on the match state.
pub struct SessionDriver {
    shutdown_tx: watch::Sender<bool>,
    connection_rx: watch::Receiver<ConnectionStatus>,
    retry_tx: mpsc::UnboundedSender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionDriver {
    /// Spawn the driver tasks for `session`.
    pub fn spawn(session: SharedSession, gateway: Arc<dyn MatchGateway>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (connection_tx, connection_rx) = watch::channel(ConnectionStatus {
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
        });
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();

        let event_task = tokio::spawn(run_event_loop(
            session.clone(),
            gateway.clone(),
            connection_tx,
            shutdown_rx.clone(),
            retry_rx,
        ));
        let tick_task = tokio::spawn(run_tick_loop(session, gateway, shutdown_rx));

        Self {
            shutdown_tx,
            connection_rx,
            retry_tx,
            tasks: vec![event_task, tick_task],
        }
    }

    /// Connection status updates for display.
    pub fn connection_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection_rx.clone()
    }

    /// Forward a manual retry request to the current monitor, if one runs.
    pub fn retry_now(&self) {
        let _ = self.retry_tx.send(());
    }

    /// Stop all driver tasks and tear the monitor down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for SessionDriver {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Applies inbound events in arrival order and keeps the monitor's lifetime
/// aligned with the live phase set.
async fn run_event_loop(
    session: SharedSession,
    gateway: Arc<dyn MatchGateway>,
    connection_tx: watch::Sender<ConnectionStatus>,
    mut shutdown: watch::Receiver<bool>,
    mut retry_rx: mpsc::UnboundedReceiver<()>,
) {
    let (events_tx, mut events_rx) = mpsc::channel::<MatchStreamEvent>(32);
    let mut phase_rx = session.phase_watch();

    let mut monitor: Option<ConnectionMonitor> = None;

    // The monitor only exists while the phase is in the live set; outside it
    // the subscription is torn down entirely rather than left idle.
    let sync_monitor = |phase: MatchPhase, monitor: &mut Option<ConnectionMonitor>| {
        if phase.is_live() && monitor.is_none() {
            *monitor = Some(ConnectionMonitor::spawn(
                gateway.clone(),
                session.match_id(),
                session.config(),
                events_tx.clone(),
                connection_tx.clone(),
            ));
        } else if !phase.is_live() && monitor.is_some() {
            if let Some(active) = monitor.take() {
                active.shutdown();
            }
            debug!(match_id = %session.match_id(), ?phase, "monitor torn down outside live set");
            let _ = connection_tx.send(ConnectionStatus {
                state: ConnectionState::Disconnected,
                reconnect_attempts: 0,
            });
        }
    };

    let initial_phase = session.phase().await;
    sync_monitor(initial_phase, &mut monitor);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if let Some(active) = monitor.take() {
                    active.shutdown();
                }
                return;
            }
            inbound = events_rx.recv() => {
                let Some(event) = inbound else {
                    // We hold a sender ourselves, so this cannot happen; bail
                    // out rather than spin if it ever does.
                    return;
                };
                let phase = session.apply_event(event).await;
                sync_monitor(phase, &mut monitor);
            }
            changed = phase_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                let phase = *phase_rx.borrow_and_update();
                sync_monitor(phase, &mut monitor);
            }
            request = retry_rx.recv() => {
                if request.is_none() {
                    return;
                }
                if let Some(active) = monitor.as_ref() {
                    active.retry_now();
                }
            }
        }
    }
}

/// Recomputes the local countdown every tick and refetches the match
/// document periodically to back up the push channel.
async fn run_tick_loop(
    session: SharedSession,
    gateway: Arc<dyn MatchGateway>,
    mut shutdown: watch::Receiver<bool>,
) {
    let tick_interval = session.config().tick_interval;
    let refresh_every = session
        .config()
        .refresh_interval
        .as_millis()
        .checked_div(tick_interval.as_millis())
        .unwrap_or(1)
        .max(1);

    let mut ticker = interval(tick_interval);
    let mut ticks: u128 = 0;

    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {
                session.republish_timer().await;

                ticks += 1;
                if ticks % refresh_every != 0 {
                    continue;
                }

                match gateway.fetch_match(session.match_id()).await {
                    Ok(snapshot) => {
                        session.apply_snapshot(snapshot).await;
                    }
                    Err(err) => {
                        // The monitor already tracks connectivity; a failed
                        // refetch never blanks the last-known-good state.
                        warn!(
                            match_id = %session.match_id(),
                            error = %err,
                            "periodic refetch failed"
                        );
                    }
                }
            }
        }
    }
}
