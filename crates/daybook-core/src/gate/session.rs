//! Gate session: owns the inputs of [`derive_gate_state`] and the only
//! side-effects tied to it.
//!
//! Entering `FeedUnlocked` starts the usage meter; leaving it (or
//! [`EngagementGate::shutdown`]) stops it. Nothing else starts or stops the
//! meter. Hosts call [`EngagementGate::recompute`] whenever an input may have
//! changed; recomputing redundantly is harmless.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::state::{derive_gate_state, GateInputs, GateState};
use crate::backend::{AppPhase, IdentityProvider, UsageStore};
use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::limits::GateLimits;
use crate::model::{EntryFields, JournalEntry, UserId, Visibility};
use crate::post_gate::{DeleteOutcome, PostGate, SaveOutcome};
use crate::usage::{MeterDriver, UsageMeter, UsageSnapshot};

pub struct EngagementGate {
    viewer: UserId,
    timezone: String,
    post_gate: PostGate,
    driver: MeterDriver,
    today_entry: Option<JournalEntry>,
    /// Local date `today_entry` was fetched for; `None` until loaded.
    entry_date: Option<String>,
    /// Last derived state, kept only to detect entering/leaving the feed.
    last_state: GateState,
    /// The meter only runs while the host is presented.
    phase: AppPhase,
}

impl EngagementGate {
    /// # Errors
    /// Returns [`CoreError::NotAuthenticated`] when no viewer is signed in.
    pub fn new(
        identity: &dyn IdentityProvider,
        timezone: impl Into<String>,
        post_gate: PostGate,
        usage_store: Arc<dyn UsageStore>,
        limits: GateLimits,
    ) -> Result<Self> {
        let viewer = identity.require_viewer()?;
        let timezone = timezone.into();
        let clock: Arc<dyn Clock> = Arc::clone(post_gate.clock());
        let meter = UsageMeter::new(viewer.clone(), timezone.clone(), usage_store, clock, limits);
        Ok(Self {
            viewer,
            timezone,
            post_gate,
            driver: MeterDriver::new(meter),
            today_entry: None,
            entry_date: None,
            last_state: GateState::Loading,
            phase: AppPhase::Foreground,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn viewer(&self) -> &str {
        &self.viewer
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    /// State as of the last [`Self::recompute`].
    pub fn state(&self) -> GateState {
        self.last_state
    }

    pub fn today_entry(&self) -> Option<&JournalEntry> {
        self.today_entry.as_ref()
    }

    pub fn post_gate(&self) -> &PostGate {
        &self.post_gate
    }

    pub fn phase(&self) -> AppPhase {
        self.phase
    }

    pub fn is_tracking(&self) -> bool {
        self.driver.is_running()
    }

    pub async fn usage(&self) -> UsageSnapshot {
        self.driver.meter().lock().await.snapshot()
    }

    pub async fn subscribe_usage(&self) -> watch::Receiver<UsageSnapshot> {
        self.driver.meter().lock().await.subscribe()
    }

    pub async fn inputs(&self) -> GateInputs {
        let meter = self.driver.meter().lock().await;
        GateInputs {
            post_loading: self.entry_date.is_none(),
            usage_loading: !meter.is_loaded(),
            has_today_entry: self.today_entry.is_some(),
            seconds_used: meter.seconds_used(),
            daily_limit: meter.daily_limit(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Reload today's entry and usage from storage, then recompute.
    ///
    /// # Errors
    /// Propagates the entry lookup failure; the gate stays `Loading` if it
    /// never loaded.
    pub async fn refresh(&mut self) -> Result<GateState> {
        self.driver.meter().lock().await.fetch_usage().await;
        let fetched = self.reload_today_entry().await;
        let state = self.recompute().await;
        fetched.map(|_| state)
    }

    /// Re-derive the state and start/stop the meter on feed entry/exit.
    ///
    /// While backgrounded the meter is never started; the foreground
    /// transition does that.
    pub async fn recompute(&mut self) -> GateState {
        let state = derive_gate_state(&self.inputs().await);
        let previous = self.last_state;
        self.last_state = state;

        if state != previous {
            debug!(viewer = %self.viewer, from = ?previous, to = ?state, "gate state changed");
        }
        match (previous == GateState::FeedUnlocked, state == GateState::FeedUnlocked) {
            (false, true) if self.phase == AppPhase::Foreground => {
                self.driver.start().await;
            }
            (true, false) => {
                self.driver.stop().await;
            }
            _ => {}
        }
        state
    }

    /// React to a usage update from the meter (tick, limit, day rollover).
    ///
    /// # Errors
    /// Propagates entry lookup failures after a day rollover.
    pub async fn on_usage_changed(&mut self) -> Result<GateState> {
        let meter_date = self.driver.meter().lock().await.local_date().to_string();
        if self.entry_date.as_deref().is_some_and(|d| d != meter_date) {
            info!(viewer = %self.viewer, date = %meter_date, "local date changed, reloading entry");
            self.reload_today_entry().await?;
        }
        Ok(self.recompute().await)
    }

    /// Foreground/background transition.
    ///
    /// Backgrounding suspends the meter; returning to the foreground reloads
    /// both inputs, which covers usage accrued elsewhere and date rollover.
    ///
    /// # Errors
    /// Propagates the refresh failure on foreground.
    pub async fn on_lifecycle(&mut self, phase: AppPhase) -> Result<GateState> {
        match phase {
            AppPhase::Background => {
                info!(viewer = %self.viewer, "app backgrounded");
                self.phase = AppPhase::Background;
                self.driver.suspend().await;
                // Not presented: the next foreground recompute counts as entering.
                self.last_state = GateState::Loading;
                Ok(self.last_state)
            }
            AppPhase::Foreground => {
                info!(viewer = %self.viewer, "app foregrounded");
                self.phase = AppPhase::Foreground;
                self.last_state = GateState::Loading;
                self.refresh().await
            }
        }
    }

    /// Wait for the next lifecycle transition and apply it.
    ///
    /// Returns `Ok(None)` once the signal's sender is gone. Hosts call this in
    /// a loop (or a `select!` arm) on a receiver from
    /// [`crate::backend::LifecycleSignal::subscribe`].
    ///
    /// # Errors
    /// See [`Self::on_lifecycle`].
    pub async fn follow_lifecycle(
        &mut self,
        phases: &mut watch::Receiver<AppPhase>,
    ) -> Result<Option<GateState>> {
        if phases.changed().await.is_err() {
            return Ok(None);
        }
        let phase = *phases.borrow_and_update();
        self.on_lifecycle(phase).await.map(Some)
    }

    /// Create or edit today's entry.
    ///
    /// If the local date moved on since today's entry was loaded, it is
    /// reloaded first so yesterday's entry is never edited. On
    /// [`CoreError::AlreadyPosted`] today's entry is re-fetched so the gate
    /// heals itself before the error is returned.
    ///
    /// # Errors
    /// See [`PostGate::save`].
    pub async fn submit(&mut self, fields: EntryFields) -> Result<SaveOutcome> {
        let today = self.post_gate.clock().local_date(&self.timezone);
        if self.entry_date.as_deref() != Some(today.as_str()) {
            info!(viewer = %self.viewer, date = %today, "reloading entry before save");
            self.reload_today_entry().await?;
            self.recompute().await;
        }
        let existing = self.today_entry.clone();
        match self
            .post_gate
            .save(&self.viewer, &self.timezone, existing.as_ref(), fields)
            .await
        {
            Ok(outcome) => {
                self.today_entry = Some(outcome.entry().clone());
                self.entry_date = Some(outcome.entry().local_date.clone());
                self.recompute().await;
                Ok(outcome)
            }
            Err(err @ CoreError::AlreadyPosted { .. }) => {
                warn!(viewer = %self.viewer, "entry already posted elsewhere, reconciling");
                if let Err(e) = self.reload_today_entry().await {
                    warn!(error = %e, "re-fetch after conflict failed");
                }
                self.recompute().await;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// "Update anyway": change only the visibility of today's entry.
    ///
    /// # Errors
    /// Returns [`CoreError::NotFound`] when there is no entry today.
    pub async fn update_visibility(&mut self, visibility: Visibility) -> Result<JournalEntry> {
        let entry = self
            .today_entry
            .as_ref()
            .ok_or_else(|| CoreError::NotFound("no entry today".into()))?;
        let updated = self
            .post_gate
            .update_visibility(&self.viewer, entry, visibility)
            .await?;
        self.today_entry = Some(updated.clone());
        Ok(updated)
    }

    /// Delete an owned entry; deleting today's flips the gate to `NeedsPost`.
    ///
    /// # Errors
    /// See [`PostGate::delete`].
    pub async fn delete_entry(&mut self, entry_id: &str) -> Result<DeleteOutcome> {
        let outcome = self
            .post_gate
            .delete(entry_id, &self.viewer, &self.timezone)
            .await?;
        if outcome.was_today {
            self.today_entry = None;
        }
        self.recompute().await;
        Ok(outcome)
    }

    /// Unmount: stop tracking and flush.
    pub async fn shutdown(&mut self) {
        self.driver.stop().await;
        self.last_state = GateState::Loading;
    }

    async fn reload_today_entry(&mut self) -> Result<()> {
        let today = self.post_gate.clock().local_date(&self.timezone);
        let entry = self
            .post_gate
            .fetch_today_entry(&self.viewer, &self.timezone)
            .await?;
        self.today_entry = entry;
        self.entry_date = Some(today);
        Ok(())
    }
}
