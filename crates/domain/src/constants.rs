//! Domain constants shared across the sync engine.
//!
//! Timing values are expressed in host ticks; the reference host ticks at
//! 20 Hz, so 20 ticks is one second of wall time.

/// Ticks between steady-state sync attempts.
pub const UPDATE_INTERVAL_TICKS: i32 = 20;

/// Ticks to wait before an in-flight request batch is presumed lost.
pub const REQUEST_TIMEOUT_TICKS: i32 = 20 * 60;

/// Base suspension after any failed exchange, scaled by failure severity.
pub const ERROR_SUSPEND_TICKS: i32 = 20 * 60;

/// Sentinel value for a permanently halted update timer.
pub const TIMER_HALTED: i32 = -1;

/// Capacity of a provider's outbound request queue.
pub const REQUEST_QUEUE_CAPACITY: usize = 2048;

/// Default accumulated failure severity that trips a provider.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 50;

/// Maximum length of a preference value, in characters.
pub const MAX_VALUE_LEN: usize = 255;

/// Maximum length of a preference key, in characters.
pub const MAX_KEY_LEN: usize = 32;

/// Ticks between flushes of a dirty offline store.
pub const OFFLINE_COMMIT_TICKS: u32 = 20 * 3;

/// Seconds a successful session validation stays fresh.
pub const SESSION_FRESHNESS_SECS: u64 = 300;

/// Connect/read timeout for a single HTTP exchange, in milliseconds.
pub const HTTP_TIMEOUT_MSEC: u64 = 5000;
