use std::sync::mpsc::Sender;

use serde::Serialize;

use super::{EffectId, EffectInstanceId, EffectState};

/// Lifecycle notification for one scheduled effect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EffectEvent {
    Scheduled {
        instance: EffectInstanceId,
        effect: EffectId,
        name: String,
        /// Seconds
        delay: f64,
        /// Seconds
        duration: f64,
    },
    Applied {
        instance: EffectInstanceId,
        effect: EffectId,
    },
    Reverted {
        instance: EffectInstanceId,
        effect: EffectId,
        persistent: bool,
    },
    Progress {
        instance: EffectInstanceId,
        effect: EffectId,
        fraction: f64,
        state: EffectState,
    },
    /// The instance left the active set.
    Removed {
        instance: EffectInstanceId,
        effect: EffectId,
    },
}

impl EffectEvent {
    pub fn instance(&self) -> EffectInstanceId {
        match self {
            EffectEvent::Scheduled { instance, .. }
            | EffectEvent::Applied { instance, .. }
            | EffectEvent::Reverted { instance, .. }
            | EffectEvent::Progress { instance, .. }
            | EffectEvent::Removed { instance, .. } => *instance,
        }
    }

    pub fn effect(&self) -> EffectId {
        match self {
            EffectEvent::Scheduled { effect, .. }
            | EffectEvent::Applied { effect, .. }
            | EffectEvent::Reverted { effect, .. }
            | EffectEvent::Progress { effect, .. }
            | EffectEvent::Removed { effect, .. } => *effect,
        }
    }
}

/// Receives effect lifecycle notifications.
pub trait EffectObserver: Send {
    fn notify(&mut self, event: &EffectEvent);
}

/// Forward events into a channel. A disconnected receiver is ignored.
impl EffectObserver for Sender<EffectEvent> {
    fn notify(&mut self, event: &EffectEvent) {
        let _ = self.send(event.clone());
    }
}
