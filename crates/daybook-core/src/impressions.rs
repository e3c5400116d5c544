//! Per-session deduplicated impression logging.
//!
//! An entry is recorded at most once per local date per session. The key is
//! marked before the write goes out so overlapping renders do not race; a
//! transient write failure un-marks it so a later render retries. Duplicate
//! rows reported by the store count as success. Nothing here ever fails the
//! caller.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::EntryStore;
use crate::clock::Clock;
use crate::model::{EntryId, Impression, UserId};

pub struct ImpressionTracker {
    store: Arc<dyn EntryStore>,
    clock: Arc<dyn Clock>,
    viewer: UserId,
    timezone: String,
    seen: HashSet<(EntryId, String)>,
}

impl ImpressionTracker {
    pub fn new(
        store: Arc<dyn EntryStore>,
        clock: Arc<dyn Clock>,
        viewer: impl Into<UserId>,
        timezone: impl Into<String>,
    ) -> Self {
        Self {
            store,
            clock,
            viewer: viewer.into(),
            timezone: timezone.into(),
            seen: HashSet::new(),
        }
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn has_seen(&self, entry_id: &str) -> bool {
        let today = self.clock.local_date(&self.timezone);
        self.seen.contains(&(entry_id.to_string(), today))
    }

    /// Record that the viewer saw `entry_id`. Returns `true` if a write was
    /// attempted and the impression is now stored.
    pub async fn record(&mut self, entry_id: &str, author_id: &str) -> bool {
        self.record_batch(&[(entry_id.to_string(), author_id.to_string())])
            .await
            > 0
    }

    /// Record several (entry, author) pairs in one write. Returns how many
    /// new impressions were stored.
    pub async fn record_batch(&mut self, items: &[(EntryId, UserId)]) -> usize {
        let today = self.clock.local_date(&self.timezone);
        let mut fresh = Vec::new();
        for (entry_id, author_id) in items {
            if self.seen.insert((entry_id.clone(), today.clone())) {
                fresh.push(Impression {
                    viewer_id: self.viewer.clone(),
                    entry_id: entry_id.clone(),
                    author_id: author_id.clone(),
                    local_date: today.clone(),
                });
            }
        }
        if fresh.is_empty() {
            return 0;
        }

        match self.store.record_impressions(&fresh).await {
            Ok(()) => {
                debug!(viewer = %self.viewer, count = fresh.len(), "impressions recorded");
                fresh.len()
            }
            Err(e) if e.is_uniqueness_conflict() => {
                debug!(viewer = %self.viewer, "impression already stored");
                fresh.len()
            }
            Err(e) => {
                warn!(viewer = %self.viewer, error = %e, "impression write failed");
                for imp in &fresh {
                    self.seen.remove(&(imp.entry_id.clone(), imp.local_date.clone()));
                }
                0
            }
        }
    }

    /// Forget everything seen this session.
    pub fn clear_session(&mut self) {
        self.seen.clear();
    }
}
