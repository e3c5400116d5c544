pub mod config;
pub mod feed;
pub mod post;
pub mod social;
pub mod stats;
pub mod status;
pub mod usage;

use std::sync::Arc;

use daybook_core::backend::{IdentityProvider, StaticIdentity};
use daybook_core::{
    Clock, Config, Database, DraftStore, EngagementGate, GateLimits, PostGate, SystemClock,
};
use serde::Serialize;

/// Everything a viewer-scoped command needs.
pub struct Context {
    pub config: Config,
    pub db: Arc<Database>,
    pub clock: Arc<dyn Clock>,
    pub viewer: String,
}

impl Context {
    /// Load config, open the database and resolve the viewer.
    ///
    /// `--as` wins over `viewer_id` in the config file.
    pub fn open(viewer_override: Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config::load()?;
        let identity = StaticIdentity(viewer_override.or_else(|| config.viewer_id.clone()));
        let viewer = identity.require_viewer().map_err(|e| {
            format!("{e}: pass --as <viewer> or run `daybook config set viewer_id <viewer>`")
        })?;
        Ok(Self {
            config,
            db: Arc::new(Database::open()?),
            clock: Arc::new(SystemClock),
            viewer,
        })
    }

    pub fn timezone(&self) -> &str {
        &self.config.timezone
    }

    pub fn today(&self) -> String {
        self.clock.local_date(self.timezone())
    }

    pub fn drafts(&self) -> Option<Arc<DraftStore>> {
        self.config
            .drafts
            .enabled
            .then(|| Arc::new(DraftStore::new(self.db.clone(), self.clock.clone())))
    }

    pub fn post_gate(&self) -> PostGate {
        let gate = PostGate::new(self.db.clone(), self.clock.clone());
        match self.drafts() {
            Some(drafts) => gate.with_drafts(drafts),
            None => gate,
        }
    }

    pub fn engagement_gate(&self) -> Result<EngagementGate, Box<dyn std::error::Error>> {
        let gate = EngagementGate::new(
            &StaticIdentity::signed_in(self.viewer.clone()),
            self.timezone(),
            self.post_gate(),
            self.db.clone(),
            GateLimits::default(),
        )?;
        Ok(gate)
    }
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
