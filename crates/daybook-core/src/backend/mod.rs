//! Interfaces to the services the engine treats as opaque.
//!
//! - [`IdentityProvider`]: who the viewer is
//! - [`EntryStore`]: entry rows, ranked feed retrieval, engagement writes
//! - [`UsageStore`]: durable per-day usage counters
//! - [`KeyValueStore`]: local key-value slots (drafts)
//! - [`LifecycleSignal`]: foreground/background transitions
//!
//! [`crate::storage::Database`] implements every store against SQLite.
//! [`MemoryBackend`] and [`MemoryKv`] are in-process stand-ins with failure
//! injection, used by tests and demos.

mod lifecycle;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{CoreError, Result};
use crate::model::{
    EntryFields, FeedQuery, Impression, JournalEntry, NewEntry, Page, UserId, Visibility,
};

pub use lifecycle::{AppPhase, LifecycleSignal};
pub use memory::{FailPoint, MemoryBackend, MemoryKv};

/// Source of the authenticated viewer id.
pub trait IdentityProvider: Send + Sync {
    fn viewer_id(&self) -> Option<UserId>;

    /// # Errors
    /// Returns [`CoreError::NotAuthenticated`] when no viewer is signed in.
    fn require_viewer(&self) -> Result<UserId> {
        self.viewer_id().ok_or(CoreError::NotAuthenticated)
    }
}

/// Fixed identity, for hosts that resolve the viewer up front.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(pub Option<UserId>);

impl StaticIdentity {
    pub fn signed_in(viewer: impl Into<UserId>) -> Self {
        Self(Some(viewer.into()))
    }

    pub fn signed_out() -> Self {
        Self(None)
    }
}

impl IdentityProvider for StaticIdentity {
    fn viewer_id(&self) -> Option<UserId> {
        self.0.clone()
    }
}

/// Row storage for entries and feed retrieval.
///
/// Implementations assign `id` and `created_at` on insert and must signal a
/// second insert for the same `(user_id, local_date)` as
/// [`CoreError::AlreadyPosted`].
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Point lookup of a user's entry for a local date.
    async fn entry_for_date(&self, user_id: &str, local_date: &str)
        -> Result<Option<JournalEntry>>;

    async fn insert_entry(&self, entry: NewEntry) -> Result<JournalEntry>;

    /// Replace every mutable field of an owned entry.
    async fn update_entry(
        &self,
        entry_id: &str,
        owner_id: &str,
        fields: EntryFields,
        edited_at: DateTime<Utc>,
    ) -> Result<JournalEntry>;

    /// Change only the visibility of an owned entry.
    async fn update_visibility(
        &self,
        entry_id: &str,
        owner_id: &str,
        visibility: Visibility,
    ) -> Result<JournalEntry>;

    /// Delete an owned entry with its bullets and chips; returns the removed row.
    async fn delete_entry(&self, entry_id: &str, owner_id: &str) -> Result<JournalEntry>;

    /// One page of the feed for `query.filter`, honoring visibility and blocks.
    async fn fetch_page(&self, query: &FeedQuery) -> Result<Page>;

    async fn set_kudos(&self, viewer_id: &str, entry_id: &str, on: bool) -> Result<()>;

    async fn set_saved(&self, viewer_id: &str, entry_id: &str, on: bool) -> Result<()>;

    async fn hide_entry(&self, viewer_id: &str, entry_id: &str) -> Result<()>;

    /// Durable impression write. Duplicates may be reported as a uniqueness
    /// conflict; callers treat that as success.
    async fn record_impressions(&self, impressions: &[Impression]) -> Result<()>;
}

/// Durable per-(user, local date) usage counters.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn load_usage(&self, user_id: &str, local_date: &str) -> Result<Option<u64>>;

    async fn save_usage(&self, user_id: &str, local_date: &str, seconds: u64) -> Result<()>;
}

/// Local durable key-value slots with get/set/delete and no transactions.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}
