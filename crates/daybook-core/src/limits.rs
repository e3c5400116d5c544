//! Fixed budgets and cadences shared across the engine.
//!
//! These are not user-configurable at runtime.

use std::time::Duration;

/// Daily feed-viewing budget in seconds.
pub const DAILY_LIMIT_SECS: u64 = 8 * 60;

/// Local counter cadence.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Durable sync cadence for the usage counter.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Minutes after creation during which every field of an entry may change.
pub const EDIT_WINDOW_MINUTES: i64 = 30;

/// Default number of entries per feed page.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Maximum bullets on one entry.
pub const MAX_BULLETS: usize = 5;

/// Maximum proof chips on one entry.
pub const MAX_CHIPS: usize = 4;

/// Maximum characters in one bullet.
pub const MAX_BULLET_CHARS: usize = 140;

/// Budget parameters handed to the meter and the gate.
///
/// Production code uses [`GateLimits::default`]; tests shrink the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateLimits {
    pub daily_limit_secs: u64,
    pub tick_interval: Duration,
    pub flush_interval: Duration,
}

impl Default for GateLimits {
    fn default() -> Self {
        Self {
            daily_limit_secs: DAILY_LIMIT_SECS,
            tick_interval: TICK_INTERVAL,
            flush_interval: FLUSH_INTERVAL,
        }
    }
}

impl GateLimits {
    pub fn with_daily_limit(daily_limit_secs: u64) -> Self {
        Self {
            daily_limit_secs,
            ..Self::default()
        }
    }
}
