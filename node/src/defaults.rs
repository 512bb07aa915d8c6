//! Default values for [`crate::Config`].

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_RECONNECT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_MAILBOX_SIZE: usize = 256;
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 1024;
pub const DEFAULT_AUTOMATED_TURN_LIMIT: usize = 64;
pub const DEFAULT_HOLD_FOR_ANIMATION: bool = false;
pub const DEFAULT_REJECT_STALE_MESSAGES: bool = true;
