//! Countdown reconciliation between locally derived time and the server's
//! pushed authoritative ticks.

use serde::Serialize;
use time::OffsetDateTime;
use tokio::time::Instant;

use crate::config::SyncConfig;
use crate::state::machine::MatchPhase;

/// Visual urgency tier of the remaining match time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Plenty of time left.
    Normal,
    /// Under the warning threshold (default five minutes).
    Warning,
    /// Under the critical threshold (default one minute).
    Critical,
}

/// Countdown value plus its urgency classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerSnapshot {
    /// Remaining match time in milliseconds. Zero is a valid terminal value;
    /// the authoritative phase transition still arrives over the push channel.
    pub remaining_ms: u64,
    /// Display urgency tier.
    pub urgency: Urgency,
}

/// What the timer area should render for the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimerDisplay {
    /// Both seats filled, countdown not started yet.
    WaitingToStart,
    /// The competitive window is over.
    Ended,
    /// No meaningful countdown for this phase.
    Pending,
    /// The match is running; show the countdown.
    Running(TimerSnapshot),
}

#[derive(Debug, Clone, Copy)]
struct ServerTick {
    remaining_ms: u64,
    is_warning: bool,
    received: Instant,
}

/// Resolves "time remaining" from either the locally computed value or a
/// recently pushed authoritative one.
///
/// Local values are always re-derived from the absolute `end_at` timestamp
/// rather than decremented, so clock skew stays bounded and a suspended
/// client self-corrects on its next tick.
#[derive(Debug)]
pub struct ClockReconciler {
    warning_threshold_ms: u64,
    critical_threshold_ms: u64,
    staleness: std::time::Duration,
    server_tick: Option<ServerTick>,
}

impl ClockReconciler {
    /// Build a reconciler from the session configuration.
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            warning_threshold_ms: config.warning_threshold_ms,
            critical_threshold_ms: config.critical_threshold_ms,
            staleness: config.server_tick_staleness,
            server_tick: None,
        }
    }

    /// Record an authoritative timer tick pushed by the server. It takes
    /// precedence over local derivation until it goes stale.
    pub fn observe_server_tick(&mut self, remaining_ms: u64, is_warning: bool) {
        self.server_tick = Some(ServerTick {
            remaining_ms,
            is_warning,
            received: Instant::now(),
        });
    }

    /// Resolve the display value for the given phase and deadline.
    ///
    /// `now` is passed in rather than read so callers on a fixed tick and
    /// tests share one code path.
    pub fn snapshot(
        &self,
        phase: MatchPhase,
        end_at: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> TimerDisplay {
        match phase {
            MatchPhase::InProgress => {}
            MatchPhase::Matched => return TimerDisplay::WaitingToStart,
            MatchPhase::SubmissionLocked
            | MatchPhase::Judging
            | MatchPhase::Finalized
            | MatchPhase::Archived => return TimerDisplay::Ended,
            MatchPhase::Created | MatchPhase::Open => return TimerDisplay::Pending,
        }

        if let Some(tick) = self.fresh_server_tick() {
            // Server values are taken verbatim, including the urgency flag;
            // the service may apply different business thresholds.
            return TimerDisplay::Running(TimerSnapshot {
                remaining_ms: tick.remaining_ms,
                urgency: if tick.is_warning {
                    Urgency::Warning
                } else {
                    Urgency::Normal
                },
            });
        }

        let Some(end_at) = end_at else {
            // InProgress without a deadline should not happen; render a
            // placeholder instead of inventing a countdown.
            return TimerDisplay::Pending;
        };

        let remaining = end_at - now;
        let remaining_ms = remaining.whole_milliseconds().max(0) as u64;
        TimerDisplay::Running(TimerSnapshot {
            remaining_ms,
            urgency: self.classify(remaining_ms),
        })
    }

    fn fresh_server_tick(&self) -> Option<&ServerTick> {
        self.server_tick
            .as_ref()
            .filter(|tick| tick.received.elapsed() <= self.staleness)
    }

    fn classify(&self, remaining_ms: u64) -> Urgency {
        if remaining_ms < self.critical_threshold_ms {
            Urgency::Critical
        } else if remaining_ms < self.warning_threshold_ms {
            Urgency::Warning
        } else {
            Urgency::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn reconciler() -> ClockReconciler {
        ClockReconciler::new(&SyncConfig::default())
    }

    fn at(unix: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(unix).unwrap()
    }

    #[test]
    fn placeholders_per_phase() {
        let clock = reconciler();
        let now = at(1_700_000_000);
        assert_eq!(
            clock.snapshot(MatchPhase::Matched, None, now),
            TimerDisplay::WaitingToStart
        );
        assert_eq!(
            clock.snapshot(MatchPhase::Finalized, None, now),
            TimerDisplay::Ended
        );
        assert_eq!(
            clock.snapshot(MatchPhase::Archived, None, now),
            TimerDisplay::Ended
        );
        assert_eq!(
            clock.snapshot(MatchPhase::Open, None, now),
            TimerDisplay::Pending
        );
    }

    #[test]
    fn ninety_seconds_left_is_warning() {
        let clock = reconciler();
        let now = at(1_700_000_000);
        let end = at(1_700_000_090);
        match clock.snapshot(MatchPhase::InProgress, Some(end), now) {
            TimerDisplay::Running(snapshot) => {
                assert_eq!(snapshot.remaining_ms, 90_000);
                assert_eq!(snapshot.urgency, Urgency::Warning);
            }
            other => panic!("expected running timer, got {other:?}"),
        }
    }

    #[test]
    fn under_a_minute_is_critical() {
        let clock = reconciler();
        let now = at(1_700_000_000);
        let end = at(1_700_000_059);
        match clock.snapshot(MatchPhase::InProgress, Some(end), now) {
            TimerDisplay::Running(snapshot) => {
                assert_eq!(snapshot.urgency, Urgency::Critical)
            }
            other => panic!("expected running timer, got {other:?}"),
        }
    }

    #[test]
    fn over_five_minutes_is_normal() {
        let clock = reconciler();
        let now = at(1_700_000_000);
        let end = at(1_700_000_600);
        match clock.snapshot(MatchPhase::InProgress, Some(end), now) {
            TimerDisplay::Running(snapshot) => assert_eq!(snapshot.urgency, Urgency::Normal),
            other => panic!("expected running timer, got {other:?}"),
        }
    }

    #[test]
    fn past_deadline_clamps_to_zero() {
        let clock = reconciler();
        let now = at(1_700_000_100);
        let end = at(1_700_000_000);
        match clock.snapshot(MatchPhase::InProgress, Some(end), now) {
            TimerDisplay::Running(snapshot) => {
                assert_eq!(snapshot.remaining_ms, 0);
                assert_eq!(snapshot.urgency, Urgency::Critical);
            }
            other => panic!("expected running timer, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_server_tick_overrides_local_value() {
        let mut clock = reconciler();
        clock.observe_server_tick(45_000, true);

        let now = at(1_700_000_000);
        // Local derivation would say ten minutes and Normal.
        let end = at(1_700_000_600);
        match clock.snapshot(MatchPhase::InProgress, Some(end), now) {
            TimerDisplay::Running(snapshot) => {
                assert_eq!(snapshot.remaining_ms, 45_000);
                assert_eq!(snapshot.urgency, Urgency::Warning);
            }
            other => panic!("expected running timer, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stale_server_tick_yields_back_to_local() {
        let mut clock = reconciler();
        clock.observe_server_tick(45_000, true);
        tokio::time::advance(Duration::from_secs(3)).await;

        let now = at(1_700_000_000);
        let end = at(1_700_000_600);
        match clock.snapshot(MatchPhase::InProgress, Some(end), now) {
            TimerDisplay::Running(snapshot) => {
                assert_eq!(snapshot.remaining_ms, 600_000);
                assert_eq!(snapshot.urgency, Urgency::Normal);
            }
            other => panic!("expected running timer, got {other:?}"),
        }
    }

    #[test]
    fn in_progress_without_deadline_is_pending() {
        let clock = reconciler();
        assert_eq!(
            clock.snapshot(MatchPhase::InProgress, None, at(1_700_000_000)),
            TimerDisplay::Pending
        );
    }
}
