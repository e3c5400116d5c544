//! Feed paging and engagement.

use daybook_core::{
    EntryStore, FeedFilter, FeedPager, GateState, ImpressionTracker, JournalEntry,
};
use serde::Serialize;
use tracing::debug;

use super::status::evaluate;
use super::{print_json, Context};

#[derive(Serialize)]
struct FeedListing<'a> {
    filter: FeedFilter,
    items: &'a [JournalEntry],
    has_more: bool,
    new_impressions: usize,
}

fn locked(state: GateState) -> Box<dyn std::error::Error> {
    match state {
        GateState::NeedsPost => "feed locked: post today's entry first (daybook post)".into(),
        GateState::TimeLimitReached => "feed locked: today's viewing time is used up".into(),
        other => format!("feed unavailable ({other:?})").into(),
    }
}

pub async fn list(
    ctx: &Context,
    filter: Option<FeedFilter>,
    pages: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = evaluate(ctx).await?.state;
    if state != GateState::FeedUnlocked {
        return Err(locked(state));
    }

    let mut pager = FeedPager::new(
        ctx.db.clone(),
        ctx.clock.clone(),
        ctx.viewer.clone(),
        ctx.timezone(),
    )
    .with_page_size(ctx.config.feed.page_size)
    .with_filter(filter.unwrap_or(ctx.config.feed.default_filter));

    pager.load_initial().await?;
    for _ in 1..pages.max(1) {
        if !pager.has_more() {
            break;
        }
        pager.load_more().await?;
    }
    debug!(count = pager.items().len(), "feed loaded");

    let mut tracker = ImpressionTracker::new(
        ctx.db.clone(),
        ctx.clock.clone(),
        ctx.viewer.clone(),
        ctx.timezone(),
    );
    let seen: Vec<_> = pager
        .items()
        .iter()
        .filter(|e| e.user_id != ctx.viewer)
        .map(|e| (e.id.clone(), e.user_id.clone()))
        .collect();
    let new_impressions = tracker.record_batch(&seen).await;

    print_json(&FeedListing {
        filter: pager.filter(),
        items: pager.items(),
        has_more: pager.has_more(),
        new_impressions,
    })
}

pub async fn kudos(ctx: &Context, entry_id: &str, on: bool) -> Result<(), Box<dyn std::error::Error>> {
    ctx.db.set_kudos(&ctx.viewer, entry_id, on).await?;
    println!("ok");
    Ok(())
}

pub async fn save(ctx: &Context, entry_id: &str, on: bool) -> Result<(), Box<dyn std::error::Error>> {
    ctx.db.set_saved(&ctx.viewer, entry_id, on).await?;
    println!("ok");
    Ok(())
}

pub async fn hide(ctx: &Context, entry_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    ctx.db.hide_entry(&ctx.viewer, entry_id).await?;
    println!("ok");
    Ok(())
}
