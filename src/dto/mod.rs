//! Wire-facing data shapes exchanged with the remote arena service.

use time::OffsetDateTime;

pub mod dispute;
pub mod event;
pub mod results;
pub mod snapshot;
pub mod validation;

/// Convert a wire epoch-milliseconds value into an absolute timestamp.
///
/// Out-of-range values collapse to the Unix epoch rather than failing the
/// whole payload; the service is not expected to produce them.
pub fn from_epoch_ms(ms: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Convert an absolute timestamp back into wire epoch milliseconds.
pub fn to_epoch_ms(timestamp: OffsetDateTime) -> i64 {
    (timestamp.unix_timestamp_nanos() / 1_000_000) as i64
}
