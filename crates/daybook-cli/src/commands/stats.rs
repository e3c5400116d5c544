use super::{print_json, Context};

/// Streaks, entry count and kudos received for the viewer.
pub fn run(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    let stats = ctx.db.profile_stats(&ctx.viewer, &ctx.today())?;
    print_json(&stats)
}
