#![forbid(unsafe_code)]

//! Update lifecycle events for hosts that want to surface progress.

use tokio::sync::broadcast;
use uuid::Uuid;

/// What the client is doing. Purely informational; no event is load-bearing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateEvent {
    CheckStarted,
    NoUpdateAvailable,
    UpdateAvailable { update_id: Uuid },
    UpdateLoaded { update_id: Uuid },
    LoadFailed { update_id: Uuid, reason: String },
    Launched { update_id: Uuid, is_embedded: bool },
}

/// Broadcast fan-out for [`UpdateEvent`]s. Slow subscribers lose old events
/// rather than blocking the client.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<UpdateEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.tx.subscribe()
    }

    /// Publish, ignoring the no-subscribers case.
    pub fn emit(&self, event: UpdateEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(32)
    }
}
