use crate::domain::events::Notification;
use crate::domain::ports::{PublishError, Publisher};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

/// In-process publisher backed by one `tokio::sync::broadcast` channel per
/// group name.
///
/// Publishing to a group nobody listens on is not an error: delivery is
/// best effort and a console that is not connected simply misses the event.
pub struct BroadcastPublisher {
    capacity: usize,
    groups: RwLock<HashMap<String, broadcast::Sender<Notification>>>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            groups: RwLock::new(HashMap::new()),
        }
    }

    pub async fn subscribe(&self, group: &str) -> broadcast::Receiver<Notification> {
        let mut groups = self.groups.write().await;
        groups
            .entry(group.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub async fn subscriber_count(&self, group: &str) -> usize {
        let groups = self.groups.read().await;
        groups.get(group).map_or(0, |tx| tx.receiver_count())
    }
}

#[async_trait]
impl Publisher for BroadcastPublisher {
    async fn publish(&self, group: &str, event: &Notification) -> Result<(), PublishError> {
        let groups = self.groups.read().await;
        let Some(sender) = groups.get(group) else {
            debug!(group, event = event.name(), "no subscribers for group");
            return Ok(());
        };
        if sender.send(event.clone()).is_err() {
            debug!(group, event = event.name(), "all subscribers of group have gone");
        }
        Ok(())
    }
}
