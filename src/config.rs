//! Runtime tunables for the synchronization core, loaded from an optional
//! JSON file with baked-in defaults.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the client looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/sync.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "CODE_ARENA_SYNC_CONFIG_PATH";

/// Immutable runtime configuration shared across one match session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Cadence of the local countdown recomputation while `InProgress`.
    pub tick_interval: Duration,
    /// How long a server-pushed tick suppresses local re-derivation.
    pub server_tick_staleness: Duration,
    /// Remaining time below which urgency becomes `Warning`.
    pub warning_threshold_ms: u64,
    /// Remaining time below which urgency becomes `Critical`.
    pub critical_threshold_ms: u64,
    /// First reconnect delay after a subscription drop.
    pub backoff_initial: Duration,
    /// Upper bound on the doubling reconnect delay.
    pub backoff_max: Duration,
    /// Consecutive failed reconnects before auto-retry stops.
    pub max_reconnect_attempts: u32,
    /// How long to wait for a confirming update after a phase-bearing
    /// command before surfacing an unknown outcome.
    pub confirmation_bound: Duration,
    /// Cadence of the periodic full refetch that backs up the push channel.
    pub refresh_interval: Duration,
}

impl SyncConfig {
    /// Load the configuration from disk, falling back to built-in defaults
    /// when the file is missing or malformed.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded sync configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse sync config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "sync config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read sync config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            server_tick_staleness: Duration::from_secs(1),
            warning_threshold_ms: 300_000,
            critical_threshold_ms: 60_000,
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(10),
            max_reconnect_attempts: 5,
            confirmation_bound: Duration::from_secs(8),
            refresh_interval: Duration::from_secs(15),
        }
    }
}

/// JSON representation of the configuration file. Every field is optional;
/// missing entries keep their default.
#[derive(Debug, Deserialize)]
struct RawConfig {
    tick_interval_ms: Option<u64>,
    server_tick_staleness_ms: Option<u64>,
    warning_threshold_ms: Option<u64>,
    critical_threshold_ms: Option<u64>,
    backoff_initial_ms: Option<u64>,
    backoff_max_ms: Option<u64>,
    max_reconnect_attempts: Option<u32>,
    confirmation_bound_ms: Option<u64>,
    refresh_interval_ms: Option<u64>,
}

impl From<RawConfig> for SyncConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = SyncConfig::default();
        let duration = |ms: Option<u64>, fallback: Duration| {
            ms.map(Duration::from_millis).unwrap_or(fallback)
        };

        Self {
            tick_interval: duration(raw.tick_interval_ms, defaults.tick_interval),
            server_tick_staleness: duration(
                raw.server_tick_staleness_ms,
                defaults.server_tick_staleness,
            ),
            warning_threshold_ms: raw
                .warning_threshold_ms
                .unwrap_or(defaults.warning_threshold_ms),
            critical_threshold_ms: raw
                .critical_threshold_ms
                .unwrap_or(defaults.critical_threshold_ms),
            backoff_initial: duration(raw.backoff_initial_ms, defaults.backoff_initial),
            backoff_max: duration(raw.backoff_max_ms, defaults.backoff_max),
            max_reconnect_attempts: raw
                .max_reconnect_attempts
                .unwrap_or(defaults.max_reconnect_attempts),
            confirmation_bound: duration(raw.confirmation_bound_ms, defaults.confirmation_bound),
            refresh_interval: duration(raw.refresh_interval_ms, defaults.refresh_interval),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
