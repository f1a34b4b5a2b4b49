//! Protocol constants shared by the scripts, the client, and backends.
//!
//! The integer sentinels are part of the wire protocol: every backend
//! (scripted store or in-process) must reply with exactly these values so
//! the typed wrappers in `tranca-client` can decode them.

use std::time::Duration;

/// Default lease applied when the caller does not choose one. A holder
/// using this lease is kept alive by the watchdog renewal task.
pub const DEFAULT_WATCHDOG_LEASE: Duration = Duration::from_millis(30_000);

/// Renewal period of the watchdog task. A third of the lease, so at least
/// two renewal attempts land before the lease would lapse even if one
/// tick is delayed by backend latency.
pub const fn renewal_interval(lease: Duration) -> Duration {
    Duration::from_millis(lease.as_millis() as u64 / 3)
}

/// Prefix of the per-key pub/sub wake channel.
pub const WAKE_CHANNEL_PREFIX: &str = "publish-lock-channel";

/// Opaque payload published on the wake channel when a key is released.
pub const WAKE_MESSAGE: i64 = 1;

/// Wake channel name for a lock key.
pub fn wake_channel(key: &str) -> String {
    format!("{}:{}", WAKE_CHANNEL_PREFIX, key)
}

// Acquire replies: success is the negative sentinel, any non-negative
// reply is the remaining TTL of the competing holder in milliseconds.
pub const ACQUIRE_SUCCESS: i64 = -1;

// Release replies.
pub const RELEASE_NOT_HELD: i64 = 0;
pub const RELEASE_PARTIAL: i64 = 1;
pub const RELEASE_RELEASED: i64 = 2;

// Renew replies.
pub const RENEW_LOST: i64 = 0;
pub const RENEW_RENEWED: i64 = 1;
