//! Timer loop for a [`UsageMeter`].
//!
//! One spawned task owns both cadences (the 1-second tick and the periodic
//! flush) so they are started and cancelled together, and only that task
//! ever flushes while tracking.

use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::meter::{TickOutcome, UsageMeter};

struct Running {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns the tick/flush task for one meter.
pub struct MeterDriver {
    meter: Arc<Mutex<UsageMeter>>,
    running: Option<Running>,
}

impl MeterDriver {
    pub fn new(meter: UsageMeter) -> Self {
        Self {
            meter: Arc::new(Mutex::new(meter)),
            running: None,
        }
    }

    /// Shared handle to the meter, for reads and `fetch_usage`.
    pub fn meter(&self) -> &Arc<Mutex<UsageMeter>> {
        &self.meter
    }

    /// Whether the timer task is alive. It exits on its own at the limit.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Start tracking and spawn the timer task.
    ///
    /// No-op (returns `false`) if already running or the meter refuses to start.
    pub async fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        // Reap a task that ended by itself (limit reached).
        self.running = None;

        let limits = {
            let mut meter = self.meter.lock().await;
            if !meter.start() {
                return false;
            }
            meter.limits()
        };

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let meter = Arc::clone(&self.meter);
        let task = tokio::spawn(async move {
            let now = Instant::now();
            let mut tick = interval_at(now + limits.tick_interval, limits.tick_interval);
            let mut flush = interval_at(now + limits.flush_interval, limits.flush_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            flush.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = tick.tick() => {
                        let mut meter = meter.lock().await;
                        match meter.tick().await {
                            TickOutcome::LimitReached | TickOutcome::Idle => break,
                            TickOutcome::Counted { .. } | TickOutcome::RolledOver { .. } => {}
                        }
                    }
                    _ = flush.tick() => {
                        meter.lock().await.flush().await;
                    }
                }
            }
            debug!("usage timer task exited");
        });

        self.running = Some(Running { stop_tx, task });
        true
    }

    /// Cancel both timers, wait for the task, then flush once.
    pub async fn stop(&mut self) {
        self.cancel_task().await;
        self.meter.lock().await.stop().await;
    }

    /// Background transition: cancel timers and suspend the meter.
    pub async fn suspend(&mut self) {
        self.cancel_task().await;
        self.meter.lock().await.suspend().await;
    }

    async fn cancel_task(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.stop_tx.send(());
            if let Err(e) = running.task.await {
                warn!(error = %e, "usage timer task failed");
            }
        }
    }
}

impl Drop for MeterDriver {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::clock::FakeClock;
    use crate::limits::GateLimits;
    use crate::usage::MeterState;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn driver(limit: u64) -> (MeterDriver, Arc<MemoryBackend>) {
        let clock = FakeClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap());
        let store = Arc::new(MemoryBackend::new(Arc::new(clock.clone())));
        let meter = UsageMeter::new(
            "alice",
            "UTC",
            store.clone(),
            Arc::new(clock),
            GateLimits::with_daily_limit(limit),
        );
        (MeterDriver::new(meter), store)
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_second() {
        let (mut driver, _) = driver(480);
        driver.meter().lock().await.fetch_usage().await;
        assert!(driver.start().await);
        assert!(!driver.start().await);

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(driver.meter().lock().await.seconds_used(), 5);
        driver.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_on_interval_and_on_stop() {
        let (mut driver, store) = driver(480);
        driver.meter().lock().await.fetch_usage().await;
        driver.start().await;

        tokio::time::sleep(Duration::from_millis(30_500)).await;
        assert_eq!(store.stored_usage("alice", "2026-05-01"), Some(30));

        tokio::time::sleep(Duration::from_secs(4)).await;
        driver.stop().await;
        assert!(!driver.is_running());
        assert_eq!(store.stored_usage("alice", "2026-05-01"), Some(34));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(driver.meter().lock().await.seconds_used(), 34);
    }

    #[tokio::test(start_paused = true)]
    async fn task_exits_at_limit() {
        let (mut driver, store) = driver(10);
        driver.meter().lock().await.fetch_usage().await;
        driver.start().await;

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(!driver.is_running());
        let meter = driver.meter().lock().await;
        assert_eq!(meter.seconds_used(), 10);
        assert_eq!(meter.state(), MeterState::Idle);
        drop(meter);
        assert_eq!(store.stored_usage("alice", "2026-05-01"), Some(10));
        assert!(!driver.start().await);
    }

    #[tokio::test(start_paused = true)]
    async fn suspend_halts_counting() {
        let (mut driver, _) = driver(480);
        driver.meter().lock().await.fetch_usage().await;
        driver.start().await;
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        driver.suspend().await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(driver.meter().lock().await.seconds_used(), 3);
        assert!(driver.start().await);
        driver.stop().await;
    }
}
