//! Feed-viewing budget.

use std::time::Duration;

use daybook_core::{AppPhase, GateState, LifecycleSignal, UsageSnapshot};
use serde::Serialize;
use tracing::info;

use super::status::evaluate;
use super::{print_json, Context};

#[derive(Serialize)]
struct Session {
    state: GateState,
    viewed_secs: u64,
    usage: UsageSnapshot,
    remaining: String,
}

/// Hold the feed open for up to `seconds`, metering the session.
///
/// Returns early when the budget runs out. Ctrl-C backgrounds the session,
/// which suspends the meter and flushes before exiting.
pub async fn watch(ctx: &Context, seconds: u64) -> Result<(), Box<dyn std::error::Error>> {
    let mut gate = ctx.engagement_gate()?;
    let state = gate.refresh().await?;
    if state != GateState::FeedUnlocked {
        gate.shutdown().await;
        let usage = gate.usage().await;
        return print_json(&Session {
            state,
            viewed_secs: 0,
            remaining: usage.remaining_label(),
            usage,
        });
    }

    let before = gate.usage().await.seconds_used;
    let mut updates = gate.subscribe_usage().await;
    let lifecycle = LifecycleSignal::new();
    let mut phases = lifecycle.subscribe();
    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    let mut state = state;
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                lifecycle.set(AppPhase::Background);
                if let Some(next) = gate.follow_lifecycle(&mut phases).await? {
                    state = next;
                }
                info!("viewing interrupted");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                state = gate.on_usage_changed().await?;
                if state != GateState::FeedUnlocked {
                    info!(state = ?state, "feed closed while viewing");
                    break;
                }
            }
        }
    }

    gate.shutdown().await;
    let usage = gate.usage().await;
    print_json(&Session {
        state,
        viewed_secs: usage.seconds_used.saturating_sub(before),
        remaining: usage.remaining_label(),
        usage,
    })
}

/// Today's counter as stored.
pub async fn show(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    let meter = evaluate(ctx).await?.meter;
    let usage = meter.snapshot();
    print_json(&serde_json::json!({
        "usage": usage,
        "remaining": usage.remaining_label(),
    }))
}
