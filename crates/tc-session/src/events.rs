//! Session-wide events, broadcast to every subscriber. Grounded in the
//! teacher's `watch`/`Notify`-based control plane (`integrity::audit_loop`),
//! generalized to a multi-consumer `broadcast` channel since more than
//! one part of an embedding app may want to observe the same session.

use tc_wire::fields::Hash32;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// This device observed its own revocation; the session has wiped
    /// its in-memory secrets and stopped.
    DeviceRevoked,
    /// New blocks are available on the server past the last index this
    /// session has applied.
    NewBlockAvailable { up_to_index: u64 },
    /// A group this session knows about rotated its key.
    GroupUpdated { group_id: Hash32 },
}

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Best-effort: if nobody is subscribed, the event is simply
    /// dropped — the orchestrator's own behavior never depends on
    /// whether a subscriber is listening.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }
}
