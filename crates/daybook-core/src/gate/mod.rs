//! Engagement gate.
//!
//! ```text
//! Loading -> NeedsPost -> FeedUnlocked -> TimeLimitReached
//!    ^                                         |
//!    +------------- (recomputed) --------------+
//! ```
//!
//! There is no transition function: every state is re-derived from current
//! inputs by [`derive_gate_state`].

mod session;
mod state;

pub use session::EngagementGate;
pub use state::{derive_gate_state, GateInputs, GateState};
