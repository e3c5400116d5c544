//! Gate status without side effects.

use daybook_core::{
    derive_gate_state, GateInputs, GateLimits, GateState, JournalEntry, UsageMeter, UsageSnapshot,
};
use serde::Serialize;

use super::{print_json, Context};

/// Gate inputs read once from storage. The meter is loaded but never started.
pub struct Evaluation {
    pub state: GateState,
    pub today_entry: Option<JournalEntry>,
    pub meter: UsageMeter,
}

#[derive(Serialize)]
struct Status {
    viewer: String,
    local_date: String,
    state: GateState,
    today_entry: Option<JournalEntry>,
    editable: bool,
    edit_window_remaining_secs: i64,
    usage: UsageSnapshot,
    remaining: String,
}

pub async fn evaluate(ctx: &Context) -> Result<Evaluation, Box<dyn std::error::Error>> {
    let today_entry = ctx
        .post_gate()
        .fetch_today_entry(&ctx.viewer, ctx.timezone())
        .await?;

    let mut meter = UsageMeter::new(
        ctx.viewer.clone(),
        ctx.timezone(),
        ctx.db.clone(),
        ctx.clock.clone(),
        GateLimits::default(),
    );
    meter.fetch_usage().await;

    let state = derive_gate_state(&GateInputs {
        post_loading: false,
        usage_loading: false,
        has_today_entry: today_entry.is_some(),
        seconds_used: meter.seconds_used(),
        daily_limit: meter.daily_limit(),
    });
    Ok(Evaluation {
        state,
        today_entry,
        meter,
    })
}

pub async fn run(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    let post_gate = ctx.post_gate();
    let Evaluation {
        state,
        today_entry,
        meter,
    } = evaluate(ctx).await?;

    let (editable, edit_window_remaining_secs) = match &today_entry {
        Some(entry) => (
            post_gate.is_editable(entry),
            post_gate.edit_window_remaining(entry).num_seconds(),
        ),
        None => (false, 0),
    };

    print_json(&Status {
        viewer: ctx.viewer.clone(),
        local_date: ctx.today(),
        state,
        today_entry,
        editable,
        edit_window_remaining_secs,
        remaining: meter.format_remaining(),
        usage: meter.snapshot(),
    })
}
