//! Pure derivation of the application mode.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateState {
    Loading,
    NeedsPost,
    FeedUnlocked,
    TimeLimitReached,
}

/// Everything the gate is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateInputs {
    pub post_loading: bool,
    pub usage_loading: bool,
    pub has_today_entry: bool,
    pub seconds_used: u64,
    pub daily_limit: u64,
}

/// Derive the gate state. The budget check wins over the post check.
pub fn derive_gate_state(inputs: &GateInputs) -> GateState {
    if inputs.post_loading || inputs.usage_loading {
        GateState::Loading
    } else if inputs.seconds_used >= inputs.daily_limit {
        GateState::TimeLimitReached
    } else if !inputs.has_today_entry {
        GateState::NeedsPost
    } else {
        GateState::FeedUnlocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn loaded(has_today_entry: bool, seconds_used: u64) -> GateInputs {
        GateInputs {
            post_loading: false,
            usage_loading: false,
            has_today_entry,
            seconds_used,
            daily_limit: 480,
        }
    }

    #[test]
    fn loading_dominates() {
        let mut inputs = loaded(true, 0);
        inputs.post_loading = true;
        assert_eq!(derive_gate_state(&inputs), GateState::Loading);
        inputs.post_loading = false;
        inputs.usage_loading = true;
        assert_eq!(derive_gate_state(&inputs), GateState::Loading);
    }

    #[test]
    fn needs_post_then_unlocked() {
        assert_eq!(derive_gate_state(&loaded(false, 0)), GateState::NeedsPost);
        assert_eq!(derive_gate_state(&loaded(true, 0)), GateState::FeedUnlocked);
        assert_eq!(derive_gate_state(&loaded(true, 479)), GateState::FeedUnlocked);
    }

    #[test]
    fn exhausted_budget_beats_missing_post() {
        assert_eq!(derive_gate_state(&loaded(false, 480)), GateState::TimeLimitReached);
        assert_eq!(derive_gate_state(&loaded(true, 480)), GateState::TimeLimitReached);
    }

    proptest! {
        #[test]
        fn over_limit_is_always_time_limit(has_entry in any::<bool>(), over in 0u64..10_000) {
            let inputs = loaded(has_entry, 480 + over);
            prop_assert_eq!(derive_gate_state(&inputs), GateState::TimeLimitReached);
        }

        #[test]
        fn derivation_is_idempotent(
            has_entry in any::<bool>(),
            used in 0u64..1_000,
            post_loading in any::<bool>(),
            usage_loading in any::<bool>()
        ) {
            let inputs = GateInputs {
                post_loading,
                usage_loading,
                has_today_entry: has_entry,
                seconds_used: used,
                daily_limit: 480,
            };
            prop_assert_eq!(derive_gate_state(&inputs), derive_gate_state(&inputs));
        }
    }
}
