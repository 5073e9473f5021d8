//! Topic-based change notifications.
//!
//! Repositories publish one [`EntityEvent`] per successful write. Whoever owns
//! the transport subscribes to the topics it forwards; nothing here is global.

use std::collections::HashMap;
use std::sync::Arc;

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// One topic per entity kind.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Topic {
    Node,
    Link,
    Vote,
    User,
}

impl Topic {
    pub const ALL: [Topic; 4] = [Topic::Node, Topic::Link, Topic::Vote, Topic::User];
}

/// Type of change carried by an event.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEvent {
    pub topic: Topic,
    pub action: ChangeAction,
    pub id: ObjectId,
}

/// Broadcast bus with one channel per [`Topic`].
///
/// Cloning is cheap and every clone publishes into the same channels.
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<HashMap<Topic, broadcast::Sender<EntityEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    /// Each topic buffers up to `capacity` events for slow receivers.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let channels = Topic::ALL
            .iter()
            .map(|&topic| (topic, broadcast::channel(capacity).0))
            .collect();
        Self {
            channels: Arc::new(channels),
        }
    }

    /// Publish to `topic`. Having no subscribers is not an error.
    pub fn publish(&self, topic: Topic, action: ChangeAction, id: ObjectId) {
        let Some(tx) = self.channels.get(&topic) else {
            return;
        };
        if tx.send(EntityEvent { topic, action, id }).is_err() {
            tracing::trace!(?topic, "No subscribers for topic");
        }
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<EntityEvent> {
        match self.channels.get(&topic) {
            Some(tx) => tx.subscribe(),
            // Every topic gets a channel in `with_capacity`.
            None => broadcast::channel(1).1,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
