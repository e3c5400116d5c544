//! Feed paging, filter switching and engagement against the in-memory backend.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use daybook_core::backend::{FailPoint, MemoryBackend};
use daybook_core::clock::FakeClock;
use daybook_core::{
    EntryFields, FeedFilter, FeedPager, ImpressionTracker, RequestKind,
};

fn seeded() -> (Arc<MemoryBackend>, FakeClock) {
    let clock = FakeClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap());
    let store = Arc::new(MemoryBackend::new(Arc::new(clock.clone())));
    store.add_friends("alice", "bob");
    let start = Utc.with_ymd_and_hms(2026, 5, 1, 6, 0, 0).unwrap();
    for i in 0..5 {
        let author = if i % 2 == 0 { "bob" } else { "carol" };
        store.seed_entry(
            author,
            &format!("2026-04-{:02}", 20 + i),
            start + Duration::minutes(i64::from(i)),
            EntryFields {
                title: Some(format!("entry {i}")),
                ..Default::default()
            },
        );
    }
    (store, clock)
}

fn pager(store: &Arc<MemoryBackend>, clock: &FakeClock) -> FeedPager {
    FeedPager::new(store.clone(), Arc::new(clock.clone()), "alice", "UTC")
        .with_page_size(2)
        .with_filter(FeedFilter::All)
}

#[tokio::test]
async fn test_pages_through_all_entries_newest_first() {
    let (store, clock) = seeded();
    let mut pager = pager(&store, &clock);

    pager.load_initial().await.unwrap();
    while pager.has_more() {
        pager.load_more().await.unwrap();
    }

    let titles: Vec<_> = pager
        .items()
        .iter()
        .filter_map(|e| e.title.as_deref())
        .collect();
    assert_eq!(titles, ["entry 4", "entry 3", "entry 2", "entry 1", "entry 0"]);
}

#[tokio::test]
async fn test_late_response_for_old_filter_is_dropped() {
    let (store, clock) = seeded();
    let mut pager = pager(&store, &clock);
    pager.load_initial().await.unwrap();

    let stale = pager.begin_load_more().unwrap();
    let stale_page = store_page(&store, &stale.query).await;

    let switch = pager.change_filter(FeedFilter::Friends).unwrap();
    assert_eq!(switch.kind, RequestKind::Initial);
    let friends_page = store_page(&store, &switch.query).await;
    assert!(pager.complete(switch, friends_page).unwrap());

    assert!(!pager.complete(stale, stale_page).unwrap());
    assert!(pager.items().iter().all(|e| e.user_id == "bob"));
}

#[tokio::test]
async fn test_filter_switch_from_deep_discover_starts_at_page_one() {
    let clock = FakeClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap());
    let store = Arc::new(MemoryBackend::new(Arc::new(clock.clone())));
    store.add_friends("alice", "bob");
    let start = Utc.with_ymd_and_hms(2026, 5, 1, 6, 0, 0).unwrap();
    for i in 0..8 {
        let author = if i < 2 { "bob" } else { "dave" };
        store.seed_entry(
            author,
            &format!("2026-04-{:02}", 10 + i),
            start + Duration::minutes(i64::from(i)),
            EntryFields::default(),
        );
    }
    let mut pager = FeedPager::new(store.clone(), Arc::new(clock.clone()), "alice", "UTC")
        .with_page_size(2)
        .with_filter(FeedFilter::Discover);

    pager.load_initial().await.unwrap();
    pager.load_more().await.unwrap();
    pager.load_more().await.unwrap();
    assert_eq!(pager.items().len(), 6);
    assert!(pager.cursor().is_some());

    let switch = pager.change_filter(FeedFilter::Friends).unwrap();
    assert_eq!(switch.query.filter, FeedFilter::Friends);
    assert!(switch.query.cursor.is_none());
    let page = store_page(&store, &switch.query).await;
    assert!(pager.complete(switch, page).unwrap());
    assert!(pager.items().iter().all(|e| e.user_id == "bob"));

    let next = pager.begin_load_more().unwrap();
    assert_eq!(next.kind, RequestKind::LoadMore);
    assert_eq!(next.query.filter, FeedFilter::Friends);
    assert_eq!(next.query.cursor, pager.items().last().map(|e| e.created_at));
}

async fn store_page(
    store: &Arc<MemoryBackend>,
    query: &daybook_core::FeedQuery,
) -> daybook_core::Result<daybook_core::Page> {
    use daybook_core::EntryStore;
    store.fetch_page(query).await
}

#[tokio::test]
async fn test_kudos_reverts_on_failed_write() {
    let (store, clock) = seeded();
    let mut pager = pager(&store, &clock);
    pager.load_initial().await.unwrap();
    let id = pager.items()[0].id.clone();

    store.fail(FailPoint::Kudos);
    assert!(pager.toggle_kudos(&id).await.is_err());
    let entry = pager.get(&id).unwrap();
    assert!(!entry.has_kudos);
    assert_eq!(entry.kudos_count, 0);

    store.recover(FailPoint::Kudos);
    assert!(pager.toggle_kudos(&id).await.unwrap());
    assert_eq!(pager.get(&id).unwrap().kudos_count, 1);
    assert!(store.has_kudos("alice", &id));
}

#[tokio::test]
async fn test_impressions_recorded_once_per_day() {
    let (store, clock) = seeded();
    let mut pager = pager(&store, &clock);
    pager.load_initial().await.unwrap();
    let mut tracker = ImpressionTracker::new(store.clone(), Arc::new(clock.clone()), "alice", "UTC");

    let seen: Vec<_> = pager
        .items()
        .iter()
        .map(|e| (e.id.clone(), e.user_id.clone()))
        .collect();
    assert_eq!(tracker.record_batch(&seen).await, 2);
    assert_eq!(tracker.record_batch(&seen).await, 0);
    assert_eq!(store.impression_count(), 2);

    clock.advance(Duration::days(1));
    assert_eq!(tracker.record_batch(&seen).await, 2);
    assert_eq!(store.impression_count(), 4);
}
