//! Client-side match lifecycle synchronization for the code arena platform.
//!
//! The crate keeps one eventually-consistent view per competitive match:
//! a forward-only phase machine fed by server push events, a countdown clock
//! reconciled against server ticks, a supervised push subscription with
//! bounded reconnect backoff, and a command dispatcher that gates user
//! intents locally before they reach the service. The server owns every
//! phase transition; the client only proposes.
//!
//! Entry point is [`state::SessionRegistry`]: hand it a [`gateway::MatchGateway`]
//! implementation and attach matches by id.

pub mod clock;
pub mod config;
pub mod dto;
pub mod error;
pub mod gateway;
pub mod monitor;
pub mod services;
pub mod state;

pub use clock::{TimerDisplay, TimerSnapshot, Urgency};
pub use config::SyncConfig;
pub use error::ServiceError;
pub use gateway::{EventStream, GatewayError, MatchGateway};
pub use monitor::{ConnectionMonitor, ConnectionState, ConnectionStatus};
pub use services::dispatcher::CommandDispatcher;
pub use state::{
    AttachedMatch, CommandOutcome, MatchPhase, MatchSession, SessionRegistry, SharedSession,
};
