//! Today's required post and its edit window.
//!
//! Every entry is fully editable for [`EDIT_WINDOW_MINUTES`] after its
//! server-assigned `created_at`. After that only visibility may change; any
//! other change is rejected with [`CoreError::WindowExpired`], which hosts turn
//! into an "update visibility anyway" prompt backed by
//! [`PostGate::update_visibility`].

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::EntryStore;
use crate::clock::Clock;
use crate::draft::DraftStore;
use crate::error::{CoreError, Result};
use crate::limits::EDIT_WINDOW_MINUTES;
use crate::model::{EntryFields, JournalEntry, NewEntry, Visibility};

/// How a save was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "entry", rename_all = "snake_case")]
pub enum SaveOutcome {
    Created(JournalEntry),
    Updated(JournalEntry),
    /// Window expired and only visibility differed.
    VisibilityUpdated(JournalEntry),
    /// Window expired and nothing differed.
    Unchanged(JournalEntry),
}

impl SaveOutcome {
    pub fn entry(&self) -> &JournalEntry {
        match self {
            SaveOutcome::Created(e)
            | SaveOutcome::Updated(e)
            | SaveOutcome::VisibilityUpdated(e)
            | SaveOutcome::Unchanged(e) => e,
        }
    }

    pub fn into_entry(self) -> JournalEntry {
        match self {
            SaveOutcome::Created(e)
            | SaveOutcome::Updated(e)
            | SaveOutcome::VisibilityUpdated(e)
            | SaveOutcome::Unchanged(e) => e,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    /// The deleted entry was the viewer's entry for today.
    pub was_today: bool,
    pub entry: JournalEntry,
}

pub struct PostGate {
    store: Arc<dyn EntryStore>,
    clock: Arc<dyn Clock>,
    drafts: Option<Arc<DraftStore>>,
}

impl PostGate {
    pub fn new(store: Arc<dyn EntryStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            drafts: None,
        }
    }

    /// Clear the local draft whenever the day's entry is saved.
    pub fn with_drafts(mut self, drafts: Arc<DraftStore>) -> Self {
        self.drafts = Some(drafts);
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The viewer's entry for today's local date. `Ok(None)` means not posted yet.
    pub async fn fetch_today_entry(
        &self,
        viewer_id: &str,
        timezone: &str,
    ) -> Result<Option<JournalEntry>> {
        let today = self.clock.local_date(timezone);
        self.store.entry_for_date(viewer_id, &today).await
    }

    /// `now - created_at <= 30 minutes`.
    pub fn is_editable(&self, entry: &JournalEntry) -> bool {
        self.clock.now() - entry.created_at <= Duration::minutes(EDIT_WINDOW_MINUTES)
    }

    /// Time left in the edit window, zero once it has closed.
    pub fn edit_window_remaining(&self, entry: &JournalEntry) -> Duration {
        let closes = entry.created_at + Duration::minutes(EDIT_WINDOW_MINUTES);
        (closes - self.clock.now()).max(Duration::zero())
    }

    /// Create today's entry, or edit `existing`.
    ///
    /// `existing` only counts when it belongs to today's local date; an entry
    /// left over from before midnight leads to a fresh insert.
    ///
    /// # Errors
    /// - [`CoreError::Validation`] for out-of-bounds bullets or chips
    /// - [`CoreError::AlreadyPosted`] if another insert for today won the race
    /// - [`CoreError::WindowExpired`] for content changes after the window
    /// - [`CoreError::NotFound`] if `existing` is not owned by `viewer_id`
    /// - store failures otherwise
    pub async fn save(
        &self,
        viewer_id: &str,
        timezone: &str,
        existing: Option<&JournalEntry>,
        fields: EntryFields,
    ) -> Result<SaveOutcome> {
        let fields = fields.normalized()?;
        let local_date = self.clock.local_date(timezone);
        // An entry from an earlier local date is never today's.
        let existing = existing.filter(|entry| {
            let current = entry.local_date == local_date;
            if !current {
                info!(viewer = viewer_id, entry = %entry.id, date = %entry.local_date, "ignoring entry from another day");
            }
            current
        });

        let outcome = match existing {
            None => {
                let entry = self
                    .store
                    .insert_entry(NewEntry {
                        user_id: viewer_id.to_string(),
                        local_date: local_date.clone(),
                        fields,
                    })
                    .await?;
                info!(viewer = viewer_id, date = %local_date, entry = %entry.id, "entry created");
                SaveOutcome::Created(entry)
            }
            Some(entry) if entry.user_id != viewer_id => {
                return Err(CoreError::NotFound(format!("entry {}", entry.id)));
            }
            Some(entry) if self.is_editable(entry) => {
                let updated = self
                    .store
                    .update_entry(&entry.id, viewer_id, fields, self.clock.now())
                    .await?;
                info!(viewer = viewer_id, entry = %updated.id, "entry updated");
                SaveOutcome::Updated(updated)
            }
            Some(entry) => {
                if !fields.same_content(&entry.fields()) {
                    return Err(CoreError::WindowExpired);
                }
                if fields.visibility == entry.visibility {
                    return Ok(SaveOutcome::Unchanged(entry.clone()));
                }
                let updated = self
                    .store
                    .update_visibility(&entry.id, viewer_id, fields.visibility)
                    .await?;
                return Ok(SaveOutcome::VisibilityUpdated(updated));
            }
        };

        self.clear_draft();
        Ok(outcome)
    }

    /// Change only visibility. Allowed at any time for the owner.
    ///
    /// # Errors
    /// Returns [`CoreError::NotFound`] for entries the viewer does not own.
    pub async fn update_visibility(
        &self,
        viewer_id: &str,
        entry: &JournalEntry,
        visibility: Visibility,
    ) -> Result<JournalEntry> {
        if entry.user_id != viewer_id {
            return Err(CoreError::NotFound(format!("entry {}", entry.id)));
        }
        let updated = self
            .store
            .update_visibility(&entry.id, viewer_id, visibility)
            .await?;
        info!(viewer = viewer_id, entry = %entry.id, visibility = visibility.as_str(), "visibility changed");
        Ok(updated)
    }

    /// Delete an owned entry with its bullets and chips.
    ///
    /// # Errors
    /// Returns [`CoreError::NotFound`] if the entry does not exist or is not
    /// owned by `viewer_id`.
    pub async fn delete(
        &self,
        entry_id: &str,
        viewer_id: &str,
        timezone: &str,
    ) -> Result<DeleteOutcome> {
        let entry = self.store.delete_entry(entry_id, viewer_id).await?;
        let was_today = entry.local_date == self.clock.local_date(timezone);
        info!(viewer = viewer_id, entry = entry_id, was_today, "entry deleted");
        Ok(DeleteOutcome { was_today, entry })
    }

    fn clear_draft(&self) {
        if let Some(drafts) = &self.drafts {
            if let Err(e) = drafts.clear() {
                warn!(error = %e, "failed to clear draft after save");
            }
        }
    }
}
