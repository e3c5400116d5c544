//! Paged feed with filter switching and optimistic engagement.
//!
//! Loads are two-phase so hosts can run them however they like:
//! `begin_*` decides whether a request should go out and returns it, and
//! [`FeedPager::complete`] applies the response. Every request carries the
//! pager generation it was issued under; a filter change or refresh bumps the
//! generation, so responses that arrive late for an old filter are dropped.
//!
//! The async helpers ([`FeedPager::load_initial`], [`FeedPager::load_more`],
//! [`FeedPager::refresh`], [`FeedPager::switch_filter`]) run both phases
//! against the store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::EntryStore;
use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::limits::DEFAULT_PAGE_SIZE;
use crate::model::{EntryId, FeedCursor, FeedFilter, FeedQuery, JournalEntry, Page, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Page 1 for the active filter.
    Initial,
    /// The page after the current cursor.
    LoadMore,
    /// Page 1 again, replacing items.
    Refresh,
}

/// A page load issued by the pager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub query: FeedQuery,
    pub generation: u64,
    pub kind: RequestKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Engagement {
    Kudos,
    Saved,
}

/// Prior state captured by an optimistic mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a Revert restores the prior state if the remote write fails"]
pub struct Revert {
    entry_id: EntryId,
    kind: Engagement,
    flag: bool,
    kudos_count: u32,
}

impl Revert {
    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }
}

pub struct FeedPager {
    store: Arc<dyn EntryStore>,
    clock: Arc<dyn Clock>,
    viewer: UserId,
    timezone: String,
    page_size: usize,

    filter: FeedFilter,
    items: Vec<JournalEntry>,
    cursor: Option<FeedCursor>,
    has_more: bool,
    initial_loading: bool,
    in_flight: bool,
    generation: u64,
}

impl FeedPager {
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
            page_size: DEFAULT_PAGE_SIZE,
            filter: FeedFilter::default(),
            items: Vec::new(),
            cursor: None,
            has_more: false,
            initial_loading: false,
            in_flight: false,
            generation: 0,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_filter(mut self, filter: FeedFilter) -> Self {
        self.filter = filter;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn filter(&self) -> FeedFilter {
        self.filter
    }

    pub fn items(&self) -> &[JournalEntry] {
        &self.items
    }

    pub fn get(&self, entry_id: &str) -> Option<&JournalEntry> {
        self.items.iter().find(|e| e.id == entry_id)
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn cursor(&self) -> Option<FeedCursor> {
        self.cursor
    }

    pub fn is_initial_loading(&self) -> bool {
        self.initial_loading
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ── Two-phase loads ──────────────────────────────────────────────

    /// Page 1 for the active filter. `None` if page 1 is already pending.
    pub fn begin_initial(&mut self) -> Option<PageRequest> {
        if self.initial_loading {
            return None;
        }
        self.generation += 1;
        self.initial_loading = true;
        Some(self.issue(RequestKind::Initial, None))
    }

    /// Next page. `None` while anything is in flight, while page 1 is
    /// pending, or when the last page has been seen.
    pub fn begin_load_more(&mut self) -> Option<PageRequest> {
        if self.in_flight || self.initial_loading || !self.has_more {
            return None;
        }
        Some(self.issue(RequestKind::LoadMore, self.cursor))
    }

    /// Page 1 again. Supersedes whatever is in flight.
    pub fn begin_refresh(&mut self) -> PageRequest {
        self.generation += 1;
        self.issue(RequestKind::Refresh, None)
    }

    /// Switch filters. Rendered items stay until the new page 1 arrives.
    ///
    /// `None` when `filter` is already active and loaded or loading.
    pub fn change_filter(&mut self, filter: FeedFilter) -> Option<PageRequest> {
        if filter == self.filter && (self.initial_loading || self.generation > 0) {
            return None;
        }
        debug!(from = self.filter.as_str(), to = filter.as_str(), "feed filter changed");
        self.filter = filter;
        self.cursor = None;
        self.has_more = false;
        self.generation += 1;
        self.initial_loading = true;
        Some(self.issue(RequestKind::Initial, None))
    }

    /// Apply the response to `request`.
    ///
    /// Returns `Ok(false)` when the response belongs to a superseded
    /// generation and was dropped.
    ///
    /// # Errors
    /// Returns the load error for a current-generation request.
    pub fn complete(&mut self, request: PageRequest, result: Result<Page>) -> Result<bool> {
        if request.generation != self.generation {
            debug!(
                stale = request.generation,
                current = self.generation,
                filter = request.query.filter.as_str(),
                "dropping stale feed page"
            );
            return Ok(false);
        }
        self.in_flight = false;
        self.initial_loading = false;

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, filter = self.filter.as_str(), "feed page load failed");
                return Err(e);
            }
        };

        self.has_more = page.has_more;
        match request.kind {
            RequestKind::Initial | RequestKind::Refresh => {
                self.cursor = page.next_cursor();
                self.items = page.entries;
            }
            RequestKind::LoadMore => {
                if let Some(next) = page.next_cursor() {
                    self.cursor = Some(next);
                }
                for entry in page.entries {
                    if !self.items.iter().any(|e| e.id == entry.id) {
                        self.items.push(entry);
                    }
                }
            }
        }
        if !self.filter.is_ranked() {
            self.items
                .sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        Ok(true)
    }

    fn issue(&mut self, kind: RequestKind, cursor: Option<FeedCursor>) -> PageRequest {
        self.in_flight = true;
        PageRequest {
            query: FeedQuery {
                viewer_id: self.viewer.clone(),
                filter: self.filter,
                local_date: self.clock.local_date(&self.timezone),
                page_size: self.page_size,
                cursor,
            },
            generation: self.generation,
            kind,
        }
    }

    // ── Async loads ──────────────────────────────────────────────────

    /// # Errors
    /// Returns the store error; items are left as they were.
    pub async fn load_initial(&mut self) -> Result<()> {
        if let Some(request) = self.begin_initial() {
            self.run(request).await?;
        }
        Ok(())
    }

    /// # Errors
    /// Returns the store error; items are left as they were.
    pub async fn load_more(&mut self) -> Result<()> {
        if let Some(request) = self.begin_load_more() {
            self.run(request).await?;
        }
        Ok(())
    }

    /// # Errors
    /// Returns the store error; items are left as they were.
    pub async fn refresh(&mut self) -> Result<()> {
        let request = self.begin_refresh();
        self.run(request).await
    }

    /// # Errors
    /// Returns the store error; the previous filter's items stay rendered.
    pub async fn switch_filter(&mut self, filter: FeedFilter) -> Result<()> {
        if let Some(request) = self.change_filter(filter) {
            self.run(request).await?;
        }
        Ok(())
    }

    async fn run(&mut self, request: PageRequest) -> Result<()> {
        let result = self.store.fetch_page(&request.query).await;
        self.complete(request, result).map(|_| ())
    }

    // ── Engagement ───────────────────────────────────────────────────

    /// Set the local kudos flag, adjusting the count by one (never below 0).
    pub fn mutate_kudos(&mut self, entry_id: &str, has_kudos: bool) -> Option<Revert> {
        let entry = self.items.iter_mut().find(|e| e.id == entry_id)?;
        let revert = Revert {
            entry_id: entry.id.clone(),
            kind: Engagement::Kudos,
            flag: entry.has_kudos,
            kudos_count: entry.kudos_count,
        };
        match (entry.has_kudos, has_kudos) {
            (false, true) => entry.kudos_count += 1,
            (true, false) => entry.kudos_count = entry.kudos_count.saturating_sub(1),
            _ => {}
        }
        entry.has_kudos = has_kudos;
        Some(revert)
    }

    pub fn mutate_saved(&mut self, entry_id: &str, has_saved: bool) -> Option<Revert> {
        let entry = self.items.iter_mut().find(|e| e.id == entry_id)?;
        let revert = Revert {
            entry_id: entry.id.clone(),
            kind: Engagement::Saved,
            flag: entry.has_saved,
            kudos_count: entry.kudos_count,
        };
        entry.has_saved = has_saved;
        Some(revert)
    }

    /// Restore the exact flag and count captured by a mutation.
    pub fn revert(&mut self, revert: Revert) {
        let Some(entry) = self.items.iter_mut().find(|e| e.id == revert.entry_id) else {
            return;
        };
        match revert.kind {
            Engagement::Kudos => {
                entry.has_kudos = revert.flag;
                entry.kudos_count = revert.kudos_count;
            }
            Engagement::Saved => entry.has_saved = revert.flag,
        }
    }

    /// Flip kudos locally, write it, and roll back if the write fails.
    ///
    /// # Errors
    /// Returns [`CoreError::NotFound`] if the entry is not loaded, or the
    /// store error after reverting.
    pub async fn toggle_kudos(&mut self, entry_id: &str) -> Result<bool> {
        let target = !self.loaded(entry_id)?.has_kudos;
        let revert = self
            .mutate_kudos(entry_id, target)
            .ok_or_else(|| CoreError::NotFound(format!("entry {entry_id}")))?;
        if let Err(e) = self.store.set_kudos(&self.viewer, entry_id, target).await {
            warn!(error = %e, entry = entry_id, "kudos write failed, reverting");
            self.revert(revert);
            return Err(e);
        }
        Ok(target)
    }

    /// # Errors
    /// Same as [`Self::toggle_kudos`].
    pub async fn toggle_saved(&mut self, entry_id: &str) -> Result<bool> {
        let target = !self.loaded(entry_id)?.has_saved;
        let revert = self
            .mutate_saved(entry_id, target)
            .ok_or_else(|| CoreError::NotFound(format!("entry {entry_id}")))?;
        if let Err(e) = self.store.set_saved(&self.viewer, entry_id, target).await {
            warn!(error = %e, entry = entry_id, "save write failed, reverting");
            self.revert(revert);
            return Err(e);
        }
        Ok(target)
    }

    /// Drop an entry from the local list (e.g. after deleting it).
    pub fn remove(&mut self, entry_id: &str) -> Option<JournalEntry> {
        let idx = self.items.iter().position(|e| e.id == entry_id)?;
        Some(self.items.remove(idx))
    }

    /// Persist a hide, then remove the entry locally.
    ///
    /// # Errors
    /// Returns the store error; the entry stays listed.
    pub async fn hide(&mut self, entry_id: &str) -> Result<()> {
        self.store.hide_entry(&self.viewer, entry_id).await?;
        self.remove(entry_id);
        Ok(())
    }

    fn loaded(&self, entry_id: &str) -> Result<&JournalEntry> {
        self.get(entry_id)
            .ok_or_else(|| CoreError::NotFound(format!("entry {entry_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FailPoint, MemoryBackend};
    use crate::clock::FakeClock;
    use crate::model::{EntryFields, Visibility};
    use chrono::{Duration, TimeZone, Utc};

    struct Fixture {
        pager: FeedPager,
        store: Arc<MemoryBackend>,
        clock: FakeClock,
    }

    fn fixture(page_size: usize) -> Fixture {
        let clock = FakeClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap());
        let store = Arc::new(MemoryBackend::new(Arc::new(clock.clone())));
        let pager = FeedPager::new(store.clone(), Arc::new(clock.clone()), "viewer", "UTC")
            .with_page_size(page_size)
            .with_filter(FeedFilter::All);
        Fixture { pager, store, clock }
    }

    fn seed(f: &Fixture, author: &str, minutes_ago: i64) -> JournalEntry {
        f.store.seed_entry(
            author,
            "2026-05-01",
            f.clock.now() - Duration::minutes(minutes_ago),
            EntryFields {
                visibility: Visibility::Everyone,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn pages_follow_cursor_until_exhausted() {
        let mut f = fixture(2);
        for i in 0..5 {
            seed(&f, &format!("author{i}"), i);
        }
        f.pager.load_initial().await.unwrap();
        assert_eq!(f.pager.items().len(), 2);
        assert!(f.pager.has_more());

        f.pager.load_more().await.unwrap();
        f.pager.load_more().await.unwrap();
        assert_eq!(f.pager.items().len(), 5);
        assert!(!f.pager.has_more());

        let ages: Vec<_> = f.pager.items().iter().map(|e| e.created_at).collect();
        let mut sorted = ages.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(ages, sorted);

        f.pager.load_more().await.unwrap();
        assert_eq!(f.store.page_queries().len(), 3);
    }

    #[tokio::test]
    async fn load_more_coalesces_while_in_flight() {
        let mut f = fixture(1);
        seed(&f, "a", 1);
        seed(&f, "b", 2);
        f.pager.load_initial().await.unwrap();

        let first = f.pager.begin_load_more();
        assert!(first.is_some());
        assert!(f.pager.begin_load_more().is_none());
        assert!(f.pager.begin_load_more().is_none());
    }

    #[tokio::test]
    async fn load_more_waits_for_initial() {
        let mut f = fixture(1);
        seed(&f, "a", 1);
        let _initial = f.pager.begin_initial().unwrap();
        assert!(f.pager.begin_initial().is_none());
        assert!(f.pager.begin_load_more().is_none());
    }

    #[tokio::test]
    async fn stale_filter_response_is_dropped() {
        let mut f = fixture(10);
        let friend_entry = seed(&f, "friend", 1);
        f.store.add_friends("viewer", "friend");
        f.pager.load_initial().await.unwrap();
        let before = f.pager.items().to_vec();

        let to_friends = f.pager.change_filter(FeedFilter::Friends).unwrap();
        // Rendered items survive until page 1 arrives.
        assert_eq!(f.pager.items(), before.as_slice());

        let to_saved = f.pager.change_filter(FeedFilter::Saved).unwrap();
        let friends_page = f.store.fetch_page(&to_friends.query).await;
        assert!(!f.pager.complete(to_friends, friends_page).unwrap());
        assert_eq!(f.pager.items(), before.as_slice());

        let saved_page = f.store.fetch_page(&to_saved.query).await;
        assert!(f.pager.complete(to_saved, saved_page).unwrap());
        assert!(f.pager.items().is_empty());
        assert_eq!(f.pager.filter(), FeedFilter::Saved);
        assert!(f.pager.get(&friend_entry.id).is_none());
    }

    #[tokio::test]
    async fn same_filter_is_not_reloaded() {
        let mut f = fixture(10);
        f.pager.load_initial().await.unwrap();
        assert!(f.pager.change_filter(FeedFilter::All).is_none());
    }

    #[tokio::test]
    async fn kudos_toggle_reverts_on_failure() {
        let mut f = fixture(10);
        let entry = seed(&f, "alice", 1);
        f.store.seed_kudos("someone", &entry.id);
        f.pager.load_initial().await.unwrap();
        assert_eq!(f.pager.get(&entry.id).unwrap().kudos_count, 1);

        f.store.fail(FailPoint::Kudos);
        let err = f.pager.toggle_kudos(&entry.id).await.unwrap_err();
        assert!(err.is_retryable());
        let after = f.pager.get(&entry.id).unwrap();
        assert!(!after.has_kudos);
        assert_eq!(after.kudos_count, 1);

        f.store.recover(FailPoint::Kudos);
        assert!(f.pager.toggle_kudos(&entry.id).await.unwrap());
        let after = f.pager.get(&entry.id).unwrap();
        assert!(after.has_kudos);
        assert_eq!(after.kudos_count, 2);
        assert!(f.store.has_kudos("viewer", &entry.id));
    }

    #[tokio::test]
    async fn unkudos_never_goes_negative() {
        let mut f = fixture(10);
        let entry = seed(&f, "alice", 1);
        f.pager.load_initial().await.unwrap();
        f.pager.items[0].has_kudos = true;

        let revert = f.pager.mutate_kudos(&entry.id, false).unwrap();
        assert_eq!(f.pager.get(&entry.id).unwrap().kudos_count, 0);
        f.pager.revert(revert);
        let restored = f.pager.get(&entry.id).unwrap();
        assert!(restored.has_kudos);
        assert_eq!(restored.kudos_count, 0);
    }

    #[tokio::test]
    async fn saved_toggle_and_hide() {
        let mut f = fixture(10);
        let entry = seed(&f, "alice", 1);
        f.pager.load_initial().await.unwrap();

        assert!(f.pager.toggle_saved(&entry.id).await.unwrap());
        assert!(f.pager.get(&entry.id).unwrap().has_saved);

        f.pager.hide(&entry.id).await.unwrap();
        assert!(f.pager.get(&entry.id).is_none());
        f.pager.refresh().await.unwrap();
        assert!(f.pager.items().is_empty());
    }

    #[tokio::test]
    async fn discover_keeps_store_order() {
        let mut f = fixture(10);
        let older = seed(&f, "a", 30);
        let newer = seed(&f, "b", 1);
        f.pager = FeedPager::new(f.store.clone(), Arc::new(f.clock.clone()), "viewer", "UTC");
        assert_eq!(f.pager.filter(), FeedFilter::Discover);

        let request = f.pager.begin_initial().unwrap();
        let ranked = Page::new(vec![older.clone(), newer.clone()], 10);
        f.pager.complete(request, Ok(ranked)).unwrap();
        let ids: Vec<_> = f.pager.items().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![older.id.as_str(), newer.id.as_str()]);
    }

    #[tokio::test]
    async fn failed_page_keeps_items() {
        let mut f = fixture(10);
        seed(&f, "alice", 1);
        f.pager.load_initial().await.unwrap();
        f.store.fail(FailPoint::FeedPage);
        assert!(f.pager.refresh().await.is_err());
        assert_eq!(f.pager.items().len(), 1);
        assert!(!f.pager.is_in_flight());
    }
}
