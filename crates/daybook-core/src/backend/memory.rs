//! In-process backends with failure injection.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{EntryStore, KeyValueStore, UsageStore};
use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result};
use crate::model::{
    EntryFields, EntryId, FeedFilter, FeedQuery, Impression, JournalEntry, NewEntry, Page, UserId,
    Visibility,
};

/// Operations that can be made to fail with [`CoreError::Transient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    EntryRead,
    EntryWrite,
    FeedPage,
    Kudos,
    Saved,
    Hide,
    Impressions,
    UsageRead,
    UsageWrite,
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: Vec<JournalEntry>,
    kudos: HashSet<(UserId, EntryId)>,
    saves: HashSet<(UserId, EntryId)>,
    hidden: HashSet<(UserId, EntryId)>,
    friends: HashSet<(UserId, UserId)>,
    blocks: HashSet<(UserId, UserId)>,
    goals: HashMap<UserId, HashSet<String>>,
    regions: HashMap<UserId, String>,
    impressions: HashSet<(UserId, EntryId, String)>,
    usage: HashMap<(UserId, String), u64>,
    failing: HashSet<FailPoint>,
    impression_writes: usize,
    usage_writes: Vec<u64>,
    page_queries: Vec<FeedQuery>,
    next_id: u64,
}

impl MemoryState {
    fn check(&self, point: FailPoint) -> Result<()> {
        if self.failing.contains(&point) {
            return Err(CoreError::Transient(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    fn are_friends(&self, a: &str, b: &str) -> bool {
        self.friends.contains(&(a.to_string(), b.to_string()))
    }

    fn blocked(&self, a: &str, b: &str) -> bool {
        self.blocks.contains(&(a.to_string(), b.to_string()))
            || self.blocks.contains(&(b.to_string(), a.to_string()))
    }

    fn visible_to(&self, entry: &JournalEntry, viewer: &str) -> bool {
        if entry.user_id == viewer {
            return true;
        }
        if self.blocked(&entry.user_id, viewer) {
            return false;
        }
        match entry.visibility {
            Visibility::Everyone => true,
            Visibility::Friends => self.are_friends(&entry.user_id, viewer),
            Visibility::OnlyMe => false,
        }
    }

    fn hydrate(&self, entry: &JournalEntry, viewer: &str) -> JournalEntry {
        let mut out = entry.clone();
        out.kudos_count = self.kudos.iter().filter(|(_, id)| *id == entry.id).count() as u32;
        out.has_kudos = self.kudos.contains(&(viewer.to_string(), entry.id.clone()));
        out.has_saved = self.saves.contains(&(viewer.to_string(), entry.id.clone()));
        out
    }

    fn matches_filter(&self, entry: &JournalEntry, query: &FeedQuery) -> bool {
        let viewer = query.viewer_id.as_str();
        let own = entry.user_id == viewer;
        match query.filter {
            FeedFilter::All => true,
            FeedFilter::Discover => {
                !own
                    && entry.visibility == Visibility::Everyone
                    && !self.are_friends(&entry.user_id, viewer)
            }
            FeedFilter::Friends => self.are_friends(&entry.user_id, viewer),
            FeedFilter::Saved => self.saves.contains(&(viewer.to_string(), entry.id.clone())),
            FeedFilter::SimilarGoals => {
                let (Some(mine), Some(theirs)) =
                    (self.goals.get(viewer), self.goals.get(&entry.user_id))
                else {
                    return false;
                };
                !own && !mine.is_disjoint(theirs)
            }
            FeedFilter::Nearby => match (self.regions.get(viewer), self.regions.get(&entry.user_id)) {
                (Some(a), Some(b)) => !own && a == b,
                _ => false,
            },
        }
    }

    fn owned_index(&self, entry_id: &str, owner_id: &str) -> Result<usize> {
        self.entries
            .iter()
            .position(|e| e.id == entry_id && e.user_id == owner_id)
            .ok_or_else(|| CoreError::NotFound(format!("entry {entry_id}")))
    }
}

/// Entry, feed and usage storage held in memory.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryBackend {
    /// `clock` stamps server-assigned `created_at` values.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail(&self, point: FailPoint) {
        self.lock().failing.insert(point);
    }

    pub fn recover(&self, point: FailPoint) {
        self.lock().failing.remove(&point);
    }

    pub fn add_friends(&self, a: &str, b: &str) {
        let mut state = self.lock();
        state.friends.insert((a.to_string(), b.to_string()));
        state.friends.insert((b.to_string(), a.to_string()));
    }

    pub fn block(&self, blocker: &str, blocked: &str) {
        self.lock()
            .blocks
            .insert((blocker.to_string(), blocked.to_string()));
    }

    pub fn add_goal(&self, user: &str, goal: &str) {
        self.lock()
            .goals
            .entry(user.to_string())
            .or_default()
            .insert(goal.to_lowercase());
    }

    pub fn set_region(&self, user: &str, region: &str) {
        self.lock()
            .regions
            .insert(user.to_string(), region.to_string());
    }

    /// Insert an entry with an explicit creation instant, bypassing conflicts.
    pub fn seed_entry(
        &self,
        user: &str,
        local_date: &str,
        created_at: DateTime<Utc>,
        fields: EntryFields,
    ) -> JournalEntry {
        let mut state = self.lock();
        state.next_id += 1;
        let mut entry = JournalEntry {
            id: format!("entry-{}", state.next_id),
            user_id: user.to_string(),
            local_date: local_date.to_string(),
            created_at,
            edited_at: None,
            title: None,
            reflection: None,
            goal: None,
            bullets: Vec::new(),
            chips: Vec::new(),
            visibility: Visibility::Everyone,
            kudos_count: 0,
            has_kudos: false,
            has_saved: false,
        };
        entry.apply_fields(fields);
        state.entries.push(entry.clone());
        entry
    }

    pub fn seed_kudos(&self, viewer: &str, entry_id: &str) {
        self.lock()
            .kudos
            .insert((viewer.to_string(), entry_id.to_string()));
    }

    pub fn seed_usage(&self, user: &str, local_date: &str, seconds: u64) {
        self.lock()
            .usage
            .insert((user.to_string(), local_date.to_string()), seconds);
    }

    pub fn entry_count(&self, user: &str, local_date: &str) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.user_id == user && e.local_date == local_date)
            .count()
    }

    pub fn stored_usage(&self, user: &str, local_date: &str) -> Option<u64> {
        self.lock()
            .usage
            .get(&(user.to_string(), local_date.to_string()))
            .copied()
    }

    /// Values passed to successful and failed `save_usage` calls, in order.
    pub fn usage_writes(&self) -> Vec<u64> {
        self.lock().usage_writes.clone()
    }

    /// Number of `record_impressions` round trips attempted.
    pub fn impression_write_count(&self) -> usize {
        self.lock().impression_writes
    }

    pub fn impression_count(&self) -> usize {
        self.lock().impressions.len()
    }

    pub fn page_queries(&self) -> Vec<FeedQuery> {
        self.lock().page_queries.clone()
    }

    pub fn has_kudos(&self, viewer: &str, entry_id: &str) -> bool {
        self.lock()
            .kudos
            .contains(&(viewer.to_string(), entry_id.to_string()))
    }
}

#[async_trait]
impl EntryStore for MemoryBackend {
    async fn entry_for_date(
        &self,
        user_id: &str,
        local_date: &str,
    ) -> Result<Option<JournalEntry>> {
        let state = self.lock();
        state.check(FailPoint::EntryRead)?;
        Ok(state
            .entries
            .iter()
            .find(|e| e.user_id == user_id && e.local_date == local_date)
            .map(|e| state.hydrate(e, user_id)))
    }

    async fn insert_entry(&self, new: NewEntry) -> Result<JournalEntry> {
        let now = self.clock.now();
        let mut state = self.lock();
        state.check(FailPoint::EntryWrite)?;
        if state
            .entries
            .iter()
            .any(|e| e.user_id == new.user_id && e.local_date == new.local_date)
        {
            return Err(CoreError::AlreadyPosted {
                local_date: new.local_date,
            });
        }
        state.next_id += 1;
        let mut entry = JournalEntry {
            id: format!("entry-{}", state.next_id),
            user_id: new.user_id,
            local_date: new.local_date,
            created_at: now,
            edited_at: None,
            title: None,
            reflection: None,
            goal: None,
            bullets: Vec::new(),
            chips: Vec::new(),
            visibility: Visibility::Everyone,
            kudos_count: 0,
            has_kudos: false,
            has_saved: false,
        };
        entry.apply_fields(new.fields);
        state.entries.push(entry.clone());
        Ok(entry)
    }

    async fn update_entry(
        &self,
        entry_id: &str,
        owner_id: &str,
        fields: EntryFields,
        edited_at: DateTime<Utc>,
    ) -> Result<JournalEntry> {
        let mut state = self.lock();
        state.check(FailPoint::EntryWrite)?;
        let idx = state.owned_index(entry_id, owner_id)?;
        let entry = &mut state.entries[idx];
        entry.apply_fields(fields);
        entry.edited_at = Some(edited_at);
        let entry = entry.clone();
        Ok(state.hydrate(&entry, owner_id))
    }

    async fn update_visibility(
        &self,
        entry_id: &str,
        owner_id: &str,
        visibility: Visibility,
    ) -> Result<JournalEntry> {
        let mut state = self.lock();
        state.check(FailPoint::EntryWrite)?;
        let idx = state.owned_index(entry_id, owner_id)?;
        state.entries[idx].visibility = visibility;
        let entry = state.entries[idx].clone();
        Ok(state.hydrate(&entry, owner_id))
    }

    async fn delete_entry(&self, entry_id: &str, owner_id: &str) -> Result<JournalEntry> {
        let mut state = self.lock();
        state.check(FailPoint::EntryWrite)?;
        let idx = state.owned_index(entry_id, owner_id)?;
        let removed = state.entries.remove(idx);
        state.kudos.retain(|(_, id)| id != entry_id);
        state.saves.retain(|(_, id)| id != entry_id);
        state.hidden.retain(|(_, id)| id != entry_id);
        state.impressions.retain(|(_, id, _)| id != entry_id);
        Ok(removed)
    }

    async fn fetch_page(&self, query: &FeedQuery) -> Result<Page> {
        let mut state = self.lock();
        state.page_queries.push(query.clone());
        state.check(FailPoint::FeedPage)?;
        let viewer = query.viewer_id.as_str();
        let mut rows: Vec<&JournalEntry> = state
            .entries
            .iter()
            .filter(|e| query.cursor.map_or(true, |c| e.created_at < c))
            .filter(|e| state.visible_to(e, viewer))
            .filter(|e| !state.hidden.contains(&(viewer.to_string(), e.id.clone())))
            .filter(|e| state.matches_filter(e, query))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        let entries = rows
            .into_iter()
            .take(query.page_size)
            .map(|e| state.hydrate(e, viewer))
            .collect();
        Ok(Page::new(entries, query.page_size))
    }

    async fn set_kudos(&self, viewer_id: &str, entry_id: &str, on: bool) -> Result<()> {
        let mut state = self.lock();
        state.check(FailPoint::Kudos)?;
        let key = (viewer_id.to_string(), entry_id.to_string());
        if on {
            state.kudos.insert(key);
        } else {
            state.kudos.remove(&key);
        }
        Ok(())
    }

    async fn set_saved(&self, viewer_id: &str, entry_id: &str, on: bool) -> Result<()> {
        let mut state = self.lock();
        state.check(FailPoint::Saved)?;
        let key = (viewer_id.to_string(), entry_id.to_string());
        if on {
            state.saves.insert(key);
        } else {
            state.saves.remove(&key);
        }
        Ok(())
    }

    async fn hide_entry(&self, viewer_id: &str, entry_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.check(FailPoint::Hide)?;
        state
            .hidden
            .insert((viewer_id.to_string(), entry_id.to_string()));
        Ok(())
    }

    async fn record_impressions(&self, impressions: &[Impression]) -> Result<()> {
        let mut state = self.lock();
        state.impression_writes += 1;
        state.check(FailPoint::Impressions)?;
        let mut duplicate = false;
        for imp in impressions {
            let key = (
                imp.viewer_id.clone(),
                imp.entry_id.clone(),
                imp.local_date.clone(),
            );
            duplicate |= !state.impressions.insert(key);
        }
        if duplicate {
            return Err(CoreError::Conflict("impression already recorded".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UsageStore for MemoryBackend {
    async fn load_usage(&self, user_id: &str, local_date: &str) -> Result<Option<u64>> {
        let state = self.lock();
        state.check(FailPoint::UsageRead)?;
        Ok(state
            .usage
            .get(&(user_id.to_string(), local_date.to_string()))
            .copied())
    }

    async fn save_usage(&self, user_id: &str, local_date: &str, seconds: u64) -> Result<()> {
        let mut state = self.lock();
        state.usage_writes.push(seconds);
        state.check(FailPoint::UsageWrite)?;
        let slot = state
            .usage
            .entry((user_id.to_string(), local_date.to_string()))
            .or_insert(0);
        *slot = (*slot).max(seconds);
        Ok(())
    }
}

/// Key-value slots held in memory.
#[derive(Debug, Default)]
pub struct MemoryKv {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}
