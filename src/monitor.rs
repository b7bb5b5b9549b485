//! Long-lived event subscription management for one match: connection phase
//! tracking, reconnection backoff, and in-order event forwarding.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use serde::Serialize;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::dto::event::MatchStreamEvent;
use crate::gateway::MatchGateway;

/// Connection phase of the push subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No subscription and no automatic retry pending. The session keeps
    /// working in degraded poll-only mode; a manual retry remains available.
    Disconnected,
    /// A subscription attempt is in flight.
    Connecting,
    /// The subscription is live and delivering events.
    Connected,
    /// The subscription dropped or an attempt failed; auto-retry pending.
    Error,
}

/// Connection phase plus the retry counter, published for display.
///
/// `reconnect_attempts` never changes dispatcher behavior; it only feeds the
/// status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// Current connection phase.
    pub state: ConnectionState,
    /// Consecutive failed reconnect attempts; reset to 0 on success.
    pub reconnect_attempts: u32,
}

impl ConnectionStatus {
    fn new(state: ConnectionState, reconnect_attempts: u32) -> Self {
        Self {
            state,
            reconnect_attempts,
        }
    }
}

/// Handle to one match's running connection supervisor.
///
/// Dropping the handle (or calling [`shutdown`](Self::shutdown)) cancels any
/// in-flight reconnect timer and releases the subscription; events that race
/// teardown are discarded by the closed forwarding channel rather than
/// applied.
pub struct ConnectionMonitor {
    status_rx: watch::Receiver<ConnectionStatus>,
    shutdown_tx: watch::Sender<bool>,
    retry: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ConnectionMonitor {
    /// Spawn the supervisor for `match_id`, forwarding inbound events into
    /// `events` in arrival order and publishing connection status into
    /// `status_tx` (the caller typically keeps a receiver for display).
    pub fn spawn(
        gateway: Arc<dyn MatchGateway>,
        match_id: Uuid,
        config: &SyncConfig,
        events: mpsc::Sender<MatchStreamEvent>,
        status_tx: watch::Sender<ConnectionStatus>,
    ) -> Self {
        let status_rx = status_tx.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let retry = Arc::new(Notify::new());

        let task = tokio::spawn(run_supervisor(
            gateway,
            match_id,
            config.clone(),
            events,
            status_tx,
            shutdown_rx,
            retry.clone(),
        ));

        Self {
            status_rx,
            shutdown_tx,
            retry,
            task,
        }
    }

    /// Subscribe to connection status updates.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Restart the reconnect loop after auto-retry gave up.
    pub fn retry_now(&self) {
        self.retry.notify_one();
    }

    /// Tear the supervisor down, cancelling any pending backoff sleep.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.task.abort();
    }
}

async fn run_supervisor(
    gateway: Arc<dyn MatchGateway>,
    match_id: Uuid,
    config: SyncConfig,
    events: mpsc::Sender<MatchStreamEvent>,
    status: watch::Sender<ConnectionStatus>,
    mut shutdown: watch::Receiver<bool>,
    retry: Arc<Notify>,
) {
    let mut delay = config.backoff_initial;
    let mut attempts: u32 = 0;

    loop {
        let _ = status.send(ConnectionStatus::new(ConnectionState::Connecting, attempts));

        let subscribed = tokio::select! {
            _ = shutdown.changed() => return,
            result = gateway.subscribe(match_id) => result,
        };

        match subscribed {
            Ok(mut stream) => {
                attempts = 0;
                delay = config.backoff_initial;
                let _ = status.send(ConnectionStatus::new(ConnectionState::Connected, 0));
                info!(match_id = %match_id, "event subscription established");

                loop {
                    tokio::select! {
                        _ = shutdown.changed() => return,
                        inbound = stream.next() => match inbound {
                            Some(event) => {
                                if events.send(event).await.is_err() {
                                    // Session side is gone; nothing left to feed.
                                    return;
                                }
                            }
                            None => {
                                warn!(match_id = %match_id, "event subscription dropped");
                                let _ = status.send(ConnectionStatus::new(
                                    ConnectionState::Error,
                                    attempts,
                                ));
                                break;
                            }
                        }
                    }
                }
            }
            Err(err) => {
                attempts += 1;
                warn!(
                    match_id = %match_id,
                    error = %err,
                    attempts,
                    "subscription attempt failed"
                );
                let _ = status.send(ConnectionStatus::new(ConnectionState::Error, attempts));

                if attempts >= config.max_reconnect_attempts {
                    info!(
                        match_id = %match_id,
                        attempts,
                        "reconnect budget exhausted; entering poll-only mode"
                    );
                    let _ = status.send(ConnectionStatus::new(
                        ConnectionState::Disconnected,
                        attempts,
                    ));

                    tokio::select! {
                        _ = shutdown.changed() => return,
                        _ = retry.notified() => {
                            debug!(match_id = %match_id, "manual retry requested");
                            delay = config.backoff_initial;
                            continue;
                        }
                    }
                }
            }
        }

        let wait = jittered(delay);
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = sleep(wait) => {}
        }
        delay = (delay * 2).min(config.backoff_max);
    }
}

/// Add up to 25% random jitter so reconnecting clients spread out.
fn jittered(delay: Duration) -> Duration {
    let spread = (delay.as_millis() as u64) / 4;
    let extra = rand::rng().random_range(0..=spread);
    delay + Duration::from_millis(extra)
}
