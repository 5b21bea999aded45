use serde::Serialize;
use tokio::sync::broadcast;

/// Change notification emitted after a successful tree mutation commits.
/// Consumers update their rendered tree incrementally instead of re-querying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TreeEvent {
    NodeCreated {
        node_id: i64,
        parent_id: Option<i64>,
    },
    NodeUpdated {
        node_id: i64,
        parent_id: Option<i64>,
    },
    NodeDeleted {
        node_id: i64,
        parent_id: Option<i64>,
    },
    NodeMoved {
        node_id: i64,
        from_parent_id: Option<i64>,
        to_parent_id: Option<i64>,
    },
}

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast channel owned by the store. Subscribers hold an explicit
/// receiver; dropping it ends the subscription.
#[derive(Debug)]
pub struct TreeEvents {
    sender: broadcast::Sender<TreeEvent>,
}

impl TreeEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.sender.subscribe()
    }

    /// Send with no receivers is not an error; mutations succeed regardless
    /// of whether anyone is listening.
    pub fn emit(&self, event: TreeEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!(target: "launchtree", event = "tree_event_unobserved");
        }
    }
}

impl Default for TreeEvents {
    fn default() -> Self {
        Self::new()
    }
}
