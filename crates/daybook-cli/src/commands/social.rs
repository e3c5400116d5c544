//! Relationship data the feed filters read: friends, blocks, goals, region.

use clap::Subcommand;

use super::Context;

#[derive(Subcommand)]
pub enum SocialAction {
    /// Make two-way friends with a user
    Friend { user: String },
    /// Hide each other's entries in every feed
    Block { user: String },
    /// Add a goal used by the similar-goals filter
    Goal { goal: String },
    /// Set the region used by the nearby filter
    Region { region: String },
}

pub fn run(ctx: &Context, action: SocialAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SocialAction::Friend { user } => ctx.db.add_friends(&ctx.viewer, &user)?,
        SocialAction::Block { user } => ctx.db.block(&ctx.viewer, &user)?,
        SocialAction::Goal { goal } => ctx.db.add_goal(&ctx.viewer, &goal)?,
        SocialAction::Region { region } => ctx.db.set_region(&ctx.viewer, &region)?,
    }
    println!("ok");
    Ok(())
}
