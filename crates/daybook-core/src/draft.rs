//! Single-slot local draft of today's entry.
//!
//! The slot is keyed by (viewer, local date) inside its payload; a draft
//! belonging to another viewer or another day is treated as absent and the
//! slot is cleared. Write debouncing is the caller's concern.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::KeyValueStore;
use crate::clock::Clock;
use crate::error::Result;
use crate::model::{EntryFields, UserId};

/// Key of the one persisted draft slot.
pub const DRAFT_KEY: &str = "daybook.draft";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub viewer_id: UserId,
    pub local_date: String,
    pub saved_at: DateTime<Utc>,
    pub data: EntryFields,
}

pub struct DraftStore {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl DraftStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { kv, clock }
    }

    /// Overwrite the slot with `data` for (viewer, local_date).
    ///
    /// # Errors
    /// Returns an error if the draft cannot be serialized or written.
    pub fn save(&self, viewer_id: &str, local_date: &str, data: &EntryFields) -> Result<Draft> {
        let draft = Draft {
            viewer_id: viewer_id.to_string(),
            local_date: local_date.to_string(),
            saved_at: self.clock.now(),
            data: data.clone(),
        };
        let json = serde_json::to_string(&draft)?;
        self.kv.set(DRAFT_KEY, &json)?;
        debug!(viewer = viewer_id, date = local_date, "draft saved");
        Ok(draft)
    }

    /// The stored draft if it belongs to exactly this viewer and date.
    ///
    /// A stale or unreadable slot is deleted and reported as absent.
    ///
    /// # Errors
    /// Returns an error only if the key-value store itself fails.
    pub fn load(&self, viewer_id: &str, local_date: &str) -> Result<Option<Draft>> {
        let Some(json) = self.kv.get(DRAFT_KEY)? else {
            return Ok(None);
        };
        let draft: Draft = match serde_json::from_str(&json) {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "discarding unreadable draft");
                self.kv.delete(DRAFT_KEY)?;
                return Ok(None);
            }
        };
        if draft.viewer_id != viewer_id || draft.local_date != local_date {
            debug!(
                stored_viewer = %draft.viewer_id,
                stored_date = %draft.local_date,
                "discarding stale draft"
            );
            self.kv.delete(DRAFT_KEY)?;
            return Ok(None);
        }
        Ok(Some(draft))
    }

    /// # Errors
    /// Returns an error if the key-value store fails.
    pub fn clear(&self) -> Result<()> {
        self.kv.delete(DRAFT_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryKv;
    use crate::clock::FakeClock;
    use crate::model::{ChipKind, ProofChip, Visibility};
    use chrono::TimeZone;

    fn store() -> (DraftStore, Arc<MemoryKv>) {
        let kv = Arc::new(MemoryKv::new());
        let clock = FakeClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap());
        (DraftStore::new(kv.clone(), Arc::new(clock)), kv)
    }

    fn data() -> EntryFields {
        EntryFields {
            title: Some("Half written".into()),
            bullets: vec!["woke early".into()],
            chips: vec![ProofChip::new(ChipKind::Steps, "steps", "8000")],
            visibility: Visibility::Friends,
            ..Default::default()
        }
    }

    #[test]
    fn roundtrip_when_viewer_and_date_match() {
        let (drafts, _) = store();
        drafts.save("alice", "2026-05-01", &data()).unwrap();
        let loaded = drafts.load("alice", "2026-05-01").unwrap().unwrap();
        assert_eq!(loaded.data, data());
        assert_eq!(loaded.viewer_id, "alice");
    }

    #[test]
    fn other_date_is_absent_and_deleted() {
        let (drafts, kv) = store();
        drafts.save("alice", "2026-04-30", &data()).unwrap();
        assert!(drafts.load("alice", "2026-05-01").unwrap().is_none());
        assert!(kv.is_empty());
        assert!(drafts.load("alice", "2026-04-30").unwrap().is_none());
    }

    #[test]
    fn other_viewer_is_absent_and_deleted() {
        let (drafts, kv) = store();
        drafts.save("alice", "2026-05-01", &data()).unwrap();
        assert!(drafts.load("bob", "2026-05-01").unwrap().is_none());
        assert!(kv.is_empty());
    }

    #[test]
    fn corrupt_slot_is_discarded() {
        let (drafts, kv) = store();
        kv.set(DRAFT_KEY, "{not json").unwrap();
        assert!(drafts.load("alice", "2026-05-01").unwrap().is_none());
        assert!(kv.is_empty());
    }

    #[test]
    fn save_overwrites_single_slot() {
        let (drafts, kv) = store();
        drafts.save("alice", "2026-05-01", &data()).unwrap();
        let mut newer = data();
        newer.title = Some("Finished".into());
        drafts.save("alice", "2026-05-01", &newer).unwrap();
        assert_eq!(kv.len(), 1);
        let loaded = drafts.load("alice", "2026-05-01").unwrap().unwrap();
        assert_eq!(loaded.data.title.as_deref(), Some("Finished"));

        drafts.clear().unwrap();
        assert!(drafts.load("alice", "2026-05-01").unwrap().is_none());
    }
}
