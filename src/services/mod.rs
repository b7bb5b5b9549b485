//! Service layer: outbound command dispatch and the background session
//! driver wiring monitor, clock tick, and event application together.

pub mod dispatcher;
pub mod session_driver;
