//! # Daybook Core Library
//!
//! This library provides the engagement gate of the Daybook journaling app:
//! a viewer must post today's entry before the social feed unlocks, and feed
//! viewing is capped by a daily time budget. It follows a CLI-first
//! philosophy where every operation is available through the standalone
//! `daybook` binary.
//!
//! ## Architecture
//!
//! - **Gate**: the app mode is a pure function of the day's post and usage
//!   ([`derive_gate_state`]); [`EngagementGate`] owns its inputs and is the
//!   only place that starts or stops metering
//! - **Usage meter**: a caller-driven counter ([`UsageMeter`]) with a tokio
//!   timer task ([`MeterDriver`]) that ticks every second and flushes every 30
//! - **Posting**: one entry per viewer per local day, editable for 30
//!   minutes ([`PostGate`]), with a local draft slot ([`DraftStore`])
//! - **Feed**: filtered paging with stale-response dropping and optimistic
//!   kudos/saves ([`FeedPager`]), plus deduplicated impressions
//!   ([`ImpressionTracker`])
//! - **Storage**: SQLite reference backend ([`Database`]) behind the
//!   [`backend`] traits, and TOML configuration ([`Config`])
//!
//! Every component reads time through [`Clock`] and talks to storage through
//! the traits in [`backend`], so tests run against [`backend::MemoryBackend`]
//! and a [`clock::FakeClock`].

pub mod backend;
pub mod clock;
pub mod draft;
pub mod error;
pub mod feed;
pub mod gate;
pub mod impressions;
pub mod limits;
pub mod model;
pub mod post_gate;
pub mod stats;
pub mod storage;
pub mod usage;

pub use backend::{
    AppPhase, EntryStore, IdentityProvider, KeyValueStore, LifecycleSignal, StaticIdentity,
    UsageStore,
};
pub use clock::{Clock, SystemClock};
pub use draft::{Draft, DraftStore};
pub use error::{ConfigError, CoreError, Result, StorageError, ValidationError};
pub use feed::{FeedPager, PageRequest, RequestKind, Revert};
pub use gate::{derive_gate_state, EngagementGate, GateInputs, GateState};
pub use impressions::ImpressionTracker;
pub use limits::GateLimits;
pub use model::{
    ChipKind, EntryFields, FeedFilter, FeedQuery, JournalEntry, Page, ProofChip, Visibility,
};
pub use post_gate::{DeleteOutcome, PostGate, SaveOutcome};
pub use stats::ProfileStats;
pub use storage::{Config, Database};
pub use usage::{MeterDriver, MeterState, TickOutcome, UsageMeter, UsageSnapshot};
