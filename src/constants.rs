//! Application-wide constants for tuning and configuration
//!
//! Centralizes magic numbers to make them discoverable and configurable.

/// Interval in seconds between full mailbox fetches while a session is ready.
pub const POLL_INTERVAL_SECS: u64 = 30;

/// Trailing window in days searched by a list fetch.
pub const LIST_WINDOW_DAYS: i64 = 30;

/// Maximum length of the text preview used for list-view classification.
pub const PREVIEW_LENGTH: usize = 2000;

/// Delay in seconds before the first reconnect attempt after a failure.
pub const RECONNECT_DELAY_SECS: u64 = 10;

/// Maximum delay in seconds between reconnect attempts.
pub const MAX_RECONNECT_DELAY_SECS: u64 = 300;

/// Consecutive failed reconnects before an account is parked as failed.
/// Zero disables the limit.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 20;

/// Timeout in seconds for TCP connect, TLS handshake and login together.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Timeout in seconds for a single protocol round-trip (select, search, fetch).
pub const OPERATION_TIMEOUT_SECS: u64 = 60;

/// Upper bound in seconds for a graceful LOGOUT during teardown.
pub const LOGOUT_TIMEOUT_SECS: u64 = 5;

/// How long teardown waits for a worker to exit before aborting it.
pub const WORKER_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Characters of body text included in a chat alert.
pub const ALERT_PREVIEW_CHARS: usize = 150;

/// Characters of body text included in a reply prompt.
pub const REPLY_PROMPT_PREVIEW_CHARS: usize = 500;

/// Timeout in seconds for outbound HTTP calls (webhook, reply model).
pub const HTTP_TIMEOUT_SECS: u64 = 10;

/// Capacity of each account worker's command queue.
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the shared event channel towards the caller.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
