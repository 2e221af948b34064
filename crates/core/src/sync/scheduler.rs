//! Cadence constants for the background sync loop.

/// Periodic wake cadence in seconds while the agent is running.
pub const SYNC_WAKE_INTERVAL_SECS: u64 = 45;

/// Maximum jitter (seconds) added to periodic wake intervals.
pub const SYNC_WAKE_JITTER_SECS: u64 = 5;

/// Short delay (milliseconds) when due work is known to be queued.
pub const SYNC_PENDING_DELAY_MS: u64 = 2_000;

/// Consecutive temporary failures after which an item is reclassified as
/// permanent and surfaced for operator action.
pub const SYNC_MAX_RETRIES: i32 = 10;
