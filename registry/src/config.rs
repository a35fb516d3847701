//! # Registry Configuration & Constants
//!
//! Every magic number in ENDORSE lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Default HTTP API port for the registry node.
pub const DEFAULT_RPC_PORT: u16 = 8460;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 8461;

// ---------------------------------------------------------------------------
// Event Streaming
// ---------------------------------------------------------------------------

/// Broadcast channel capacity for registry events. 256 absorbs short bursts
/// of mutations without dropping events for connected WebSocket clients.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Retry Policy
// ---------------------------------------------------------------------------

/// How many times a read is retried after a transient store failure before
/// the error is surfaced. Reads only — mutations fail closed on the first
/// error, because a silently retried transition could double-apply.
pub const READ_RETRY_ATTEMPTS: u32 = 2;

/// Fixed backoff between read retries. Short, because sled either answers
/// in microseconds or something is wrong enough that waiting won't help.
pub const READ_RETRY_BACKOFF: Duration = Duration::from_millis(25);

// ---------------------------------------------------------------------------
// Field Bounds
// ---------------------------------------------------------------------------

/// Maximum length in bytes for the name, email, and course fields. Enough
/// for any real registrar entry, not enough for someone's dissertation.
pub const MAX_FIELD_LENGTH: usize = 512;

/// Maximum length in bytes for a caller or approver identity string.
pub const MAX_IDENTITY_LENGTH: usize = 128;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_are_distinct() {
        assert_ne!(DEFAULT_RPC_PORT, DEFAULT_METRICS_PORT);
    }

    #[test]
    fn retry_policy_is_bounded() {
        // Unbounded retries on a dead store would hang every reader.
        assert!(READ_RETRY_ATTEMPTS < 10);
        assert!(READ_RETRY_BACKOFF < Duration::from_secs(1));
    }

    #[test]
    fn field_bounds_sanity() {
        assert!(MAX_IDENTITY_LENGTH <= MAX_FIELD_LENGTH);
        assert!(MAX_FIELD_LENGTH > 0);
    }
}
