//! Daily feed-viewing meter.
//!
//! The meter is a caller-driven state machine: it never spawns timers itself.
//! [`super::MeterDriver`] calls [`UsageMeter::tick`] every second and
//! [`UsageMeter::flush`] on the sync interval; tests call them directly.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Tracking -> Idle      (stop / suspend / limit reached)
//! ```
//!
//! Failures talking to the [`UsageStore`] are logged and swallowed. A failed
//! flush leaves the last-synced marker where it was so the next flush retries
//! with the same or a larger value.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::UsageStore;
use crate::clock::Clock;
use crate::limits::GateLimits;
use crate::model::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeterState {
    Idle,
    Tracking,
}

/// What observers see after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub local_date: String,
    pub seconds_used: u64,
    pub remaining_secs: u64,
    pub state: MeterState,
}

impl UsageSnapshot {
    /// `MM:SS` rendering of the remaining budget.
    pub fn remaining_label(&self) -> String {
        format_mm_ss(self.remaining_secs)
    }
}

/// Result of one [`UsageMeter::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not tracking; nothing counted.
    Idle,
    /// One second counted.
    Counted { seconds_used: u64 },
    /// The counter hit the daily limit; tracking stopped and was flushed.
    LimitReached,
    /// The local date changed; the old day was flushed and the new day loaded.
    RolledOver { local_date: String },
}

/// Format seconds as zero-padded `MM:SS`.
pub fn format_mm_ss(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Tracks elapsed feed-viewing seconds for one viewer's current local day.
pub struct UsageMeter {
    store: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
    viewer: UserId,
    timezone: String,
    limits: GateLimits,
    local_date: String,
    seconds_used: u64,
    /// Value most recently written to (or read from) durable storage.
    last_synced: Option<u64>,
    state: MeterState,
    loaded: bool,
    tx: watch::Sender<UsageSnapshot>,
}

impl UsageMeter {
    pub fn new(
        viewer: impl Into<UserId>,
        timezone: impl Into<String>,
        store: Arc<dyn UsageStore>,
        clock: Arc<dyn Clock>,
        limits: GateLimits,
    ) -> Self {
        let timezone = timezone.into();
        let local_date = clock.local_date(&timezone);
        let (tx, _rx) = watch::channel(UsageSnapshot {
            local_date: local_date.clone(),
            seconds_used: 0,
            remaining_secs: limits.daily_limit_secs,
            state: MeterState::Idle,
        });
        Self {
            store,
            clock,
            viewer: viewer.into(),
            timezone,
            limits,
            local_date,
            seconds_used: 0,
            last_synced: None,
            state: MeterState::Idle,
            loaded: false,
            tx,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> MeterState {
        self.state
    }

    pub fn is_tracking(&self) -> bool {
        self.state == MeterState::Tracking
    }

    /// Whether [`Self::fetch_usage`] has completed at least once.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn seconds_used(&self) -> u64 {
        self.seconds_used
    }

    pub fn daily_limit(&self) -> u64 {
        self.limits.daily_limit_secs
    }

    pub fn limits(&self) -> GateLimits {
        self.limits
    }

    pub fn local_date(&self) -> &str {
        &self.local_date
    }

    pub fn last_synced(&self) -> Option<u64> {
        self.last_synced
    }

    pub fn limit_reached(&self) -> bool {
        self.seconds_used >= self.limits.daily_limit_secs
    }

    /// `max(0, daily_limit - seconds_used)`.
    pub fn remaining(&self) -> u64 {
        self.limits.daily_limit_secs.saturating_sub(self.seconds_used)
    }

    pub fn format_remaining(&self) -> String {
        format_mm_ss(self.remaining())
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            local_date: self.local_date.clone(),
            seconds_used: self.seconds_used,
            remaining_secs: self.remaining(),
            state: self.state,
        }
    }

    /// Observe every counter and state change.
    pub fn subscribe(&self) -> watch::Receiver<UsageSnapshot> {
        self.tx.subscribe()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Load today's counter from durable storage.
    ///
    /// Absent records count as zero. On the same local date the in-memory
    /// counter never moves backwards, so unsynced seconds survive a reload.
    pub async fn fetch_usage(&mut self) -> u64 {
        let today = self.clock.local_date(&self.timezone);
        if today != self.local_date {
            self.local_date = today;
            self.seconds_used = 0;
            self.last_synced = None;
        }

        match self.store.load_usage(&self.viewer, &self.local_date).await {
            Ok(stored) => {
                let stored = stored.unwrap_or(0);
                self.seconds_used = self.seconds_used.max(stored);
                self.last_synced = Some(stored);
                debug!(
                    viewer = %self.viewer,
                    date = %self.local_date,
                    stored,
                    seconds_used = self.seconds_used,
                    "usage loaded"
                );
            }
            Err(e) => {
                warn!(viewer = %self.viewer, error = %e, "failed to load usage, keeping local counter");
            }
        }
        self.loaded = true;
        self.publish();
        self.seconds_used
    }

    /// Enter `Tracking`. Returns `false` when already tracking or out of budget.
    pub fn start(&mut self) -> bool {
        if self.is_tracking() || self.limit_reached() {
            return false;
        }
        self.state = MeterState::Tracking;
        info!(viewer = %self.viewer, seconds_used = self.seconds_used, "usage tracking started");
        self.publish();
        true
    }

    /// Count one second of viewing.
    pub async fn tick(&mut self) -> TickOutcome {
        if !self.is_tracking() {
            return TickOutcome::Idle;
        }

        let today = self.clock.local_date(&self.timezone);
        if today != self.local_date {
            // Close out the old day, then continue against the new one.
            self.flush().await;
            info!(from = %self.local_date, to = %today, "usage day rolled over");
            self.fetch_usage().await;
            if self.limit_reached() {
                self.state = MeterState::Idle;
                self.publish();
                return TickOutcome::LimitReached;
            }
            return TickOutcome::RolledOver { local_date: today };
        }

        self.seconds_used = (self.seconds_used + 1).min(self.limits.daily_limit_secs);
        if self.limit_reached() {
            self.state = MeterState::Idle;
            info!(viewer = %self.viewer, "daily usage limit reached");
            self.flush().await;
            self.publish();
            return TickOutcome::LimitReached;
        }
        self.publish();
        TickOutcome::Counted {
            seconds_used: self.seconds_used,
        }
    }

    /// Write the counter to durable storage if it changed since the last sync.
    ///
    /// Returns `true` when a write succeeded.
    pub async fn flush(&mut self) -> bool {
        if self.last_synced == Some(self.seconds_used) {
            return false;
        }
        let seconds = self.seconds_used;
        match self
            .store
            .save_usage(&self.viewer, &self.local_date, seconds)
            .await
        {
            Ok(()) => {
                self.last_synced = Some(seconds);
                debug!(viewer = %self.viewer, seconds, "usage flushed");
                true
            }
            Err(e) => {
                warn!(viewer = %self.viewer, seconds, error = %e, "usage flush failed, will retry");
                false
            }
        }
    }

    /// Leave `Tracking` and flush once. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        if self.is_tracking() {
            self.state = MeterState::Idle;
            info!(viewer = %self.viewer, seconds_used = self.seconds_used, "usage tracking stopped");
        }
        self.flush().await;
        self.publish();
    }

    /// App went to the background: stop counting until an explicit `start()`.
    pub async fn suspend(&mut self) {
        debug!(viewer = %self.viewer, "usage meter suspended");
        self.stop().await;
    }

    fn publish(&self) {
        self.tx.send_replace(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FailPoint, MemoryBackend};
    use crate::clock::FakeClock;
    use chrono::{Duration, TimeZone, Utc};

    const DATE: &str = "2026-05-01";

    fn setup(limit: u64) -> (UsageMeter, Arc<MemoryBackend>, FakeClock) {
        let clock = FakeClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap());
        let store = Arc::new(MemoryBackend::new(Arc::new(clock.clone())));
        let meter = UsageMeter::new(
            "alice",
            "UTC",
            store.clone(),
            Arc::new(clock.clone()),
            GateLimits::with_daily_limit(limit),
        );
        (meter, store, clock)
    }

    #[tokio::test]
    async fn n_ticks_add_exactly_n() {
        let (mut meter, _, _) = setup(480);
        meter.fetch_usage().await;
        assert!(meter.start());
        for _ in 0..37 {
            meter.tick().await;
        }
        assert_eq!(meter.seconds_used(), 37);
        assert_eq!(meter.remaining(), 443);
        assert_eq!(meter.format_remaining(), "07:23");
    }

    #[tokio::test]
    async fn stops_exactly_at_limit_and_refuses_restart() {
        let (mut meter, store, _) = setup(480);
        meter.fetch_usage().await;
        assert!(meter.start());

        let mut outcomes = Vec::new();
        for _ in 0..480 {
            outcomes.push(meter.tick().await);
        }
        assert_eq!(outcomes.last(), Some(&TickOutcome::LimitReached));
        assert_eq!(meter.seconds_used(), 480);
        assert_eq!(meter.state(), MeterState::Idle);
        assert_eq!(store.stored_usage("alice", DATE), Some(480));

        assert_eq!(meter.tick().await, TickOutcome::Idle);
        assert!(!meter.start());
        assert_eq!(meter.seconds_used(), 480);
        assert_eq!(meter.format_remaining(), "00:00");
    }

    #[tokio::test]
    async fn fetch_treats_missing_record_as_zero() {
        let (mut meter, _, _) = setup(480);
        assert!(!meter.is_loaded());
        assert_eq!(meter.fetch_usage().await, 0);
        assert!(meter.is_loaded());
        assert_eq!(meter.last_synced(), Some(0));
    }

    #[tokio::test]
    async fn fetch_picks_up_usage_from_other_sessions() {
        let (mut meter, store, _) = setup(480);
        store.seed_usage("alice", DATE, 300);
        assert_eq!(meter.fetch_usage().await, 300);
        assert_eq!(meter.remaining(), 180);
    }

    #[tokio::test]
    async fn start_refused_when_budget_already_spent() {
        let (mut meter, store, _) = setup(480);
        store.seed_usage("alice", DATE, 600);
        meter.fetch_usage().await;
        assert!(!meter.start());
        assert_eq!(meter.remaining(), 0);
    }

    #[tokio::test]
    async fn flush_only_writes_changes() {
        let (mut meter, store, _) = setup(480);
        meter.fetch_usage().await;
        meter.start();
        assert!(!meter.flush().await);
        meter.tick().await;
        assert!(meter.flush().await);
        assert!(!meter.flush().await);
        assert_eq!(store.usage_writes(), vec![1]);
    }

    #[tokio::test]
    async fn failed_flush_keeps_counter_and_retries() {
        let (mut meter, store, _) = setup(480);
        meter.fetch_usage().await;
        meter.start();
        for _ in 0..5 {
            meter.tick().await;
        }
        store.fail(FailPoint::UsageWrite);
        assert!(!meter.flush().await);
        assert_eq!(meter.seconds_used(), 5);
        assert_eq!(meter.last_synced(), Some(0));

        store.recover(FailPoint::UsageWrite);
        meter.tick().await;
        assert!(meter.flush().await);
        assert_eq!(store.stored_usage("alice", DATE), Some(6));
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_flushes_once() {
        let (mut meter, store, _) = setup(480);
        meter.fetch_usage().await;
        meter.start();
        meter.tick().await;
        meter.tick().await;
        meter.stop().await;
        meter.stop().await;
        assert_eq!(meter.state(), MeterState::Idle);
        assert_eq!(store.usage_writes(), vec![2]);
    }

    #[tokio::test]
    async fn suspend_stops_counting_until_restarted() {
        let (mut meter, _, _) = setup(480);
        meter.fetch_usage().await;
        meter.start();
        meter.tick().await;
        meter.suspend().await;
        assert_eq!(meter.tick().await, TickOutcome::Idle);
        assert_eq!(meter.seconds_used(), 1);
        assert!(meter.start());
        meter.tick().await;
        assert_eq!(meter.seconds_used(), 2);
    }

    #[tokio::test]
    async fn load_failure_still_marks_loaded() {
        let (mut meter, store, _) = setup(480);
        store.fail(FailPoint::UsageRead);
        assert_eq!(meter.fetch_usage().await, 0);
        assert!(meter.is_loaded());
        assert_eq!(meter.last_synced(), None);
    }

    #[tokio::test]
    async fn midnight_rollover_flushes_old_day_and_resets() {
        let (mut meter, store, clock) = setup(480);
        clock.set(Utc.with_ymd_and_hms(2026, 5, 1, 23, 59, 58).unwrap());
        meter.fetch_usage().await;
        meter.start();
        meter.tick().await;
        meter.tick().await;

        clock.advance(Duration::seconds(3));
        assert_eq!(
            meter.tick().await,
            TickOutcome::RolledOver { local_date: "2026-05-02".into() }
        );
        assert_eq!(store.stored_usage("alice", DATE), Some(2));
        assert_eq!(meter.local_date(), "2026-05-02");
        assert_eq!(meter.seconds_used(), 0);
        assert!(meter.is_tracking());

        meter.tick().await;
        assert_eq!(meter.seconds_used(), 1);
    }

    #[tokio::test]
    async fn observers_see_each_tick() {
        let (mut meter, _, _) = setup(480);
        let rx = meter.subscribe();
        meter.fetch_usage().await;
        meter.start();
        meter.tick().await;
        let snap = rx.borrow().clone();
        assert_eq!(snap.seconds_used, 1);
        assert_eq!(snap.state, MeterState::Tracking);
        assert_eq!(snap.remaining_label(), "07:59");
    }

    #[test]
    fn mm_ss_formatting() {
        assert_eq!(format_mm_ss(0), "00:00");
        assert_eq!(format_mm_ss(59), "00:59");
        assert_eq!(format_mm_ss(480), "08:00");
        assert_eq!(format_mm_ss(3599), "59:59");
    }
}
