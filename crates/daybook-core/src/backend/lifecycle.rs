//! Foreground/background signal.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppPhase {
    Foreground,
    Background,
}

/// Single-producer lifecycle callback that the gate and meter subscribe to.
#[derive(Debug, Clone)]
pub struct LifecycleSignal {
    tx: watch::Sender<AppPhase>,
}

impl Default for LifecycleSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleSignal {
    /// Starts in the foreground.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AppPhase::Foreground);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<AppPhase> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> AppPhase {
        *self.tx.borrow()
    }

    /// Publish a transition. Repeated phases are not re-broadcast.
    pub fn set(&self, phase: AppPhase) {
        self.tx.send_if_modified(|current| {
            if *current == phase {
                false
            } else {
                *current = phase;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_transitions_once() {
        let signal = LifecycleSignal::new();
        let mut rx = signal.subscribe();

        signal.set(AppPhase::Foreground);
        assert!(!rx.has_changed().unwrap());

        signal.set(AppPhase::Background);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), AppPhase::Background);
        assert_eq!(signal.current(), AppPhase::Background);
    }
}
