use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use fareflow_core::{ChannelKind, DeliveryError, NotificationChannel, OutboundNotification};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Private push room of one owner.
pub fn room_for(owner_id: &str) -> String {
    format!("user:{}", owner_id)
}

/// In-process push fan-out: one broadcast channel per room. Connected clients
/// subscribe to their own room; publishing never waits for them.
pub struct PushHub {
    rooms: RwLock<HashMap<String, broadcast::Sender<OutboundNotification>>>,
    capacity: usize,
    closed: AtomicBool,
}

impl PushHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    async fn sender(&self, room: &str) -> broadcast::Sender<OutboundNotification> {
        if let Some(sender) = self.rooms.read().await.get(room) {
            return sender.clone();
        }
        self.rooms
            .write()
            .await
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    pub async fn subscribe(&self, owner_id: &str) -> broadcast::Receiver<OutboundNotification> {
        self.sender(&room_for(owner_id)).await.subscribe()
    }

    /// Removes the room unless someone subscribed again in the meantime.
    async fn prune(&self, room: &str) {
        let mut rooms = self.rooms.write().await;
        if rooms.get(room).is_some_and(|s| s.receiver_count() == 0) {
            rooms.remove(room);
        }
    }

    /// Stop accepting deliveries and drop every room.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.rooms.write().await.clear();
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl NotificationChannel for PushHub {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Push
    }

    async fn deliver(&self, notification: &OutboundNotification) -> Result<(), DeliveryError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DeliveryError::Unavailable("push hub is closed".to_string()));
        }
        let room = &notification.destination;
        let sender = self.rooms.read().await.get(room).cloned();
        let Some(sender) = sender else {
            // Nobody connected right now; push is fire-and-forget.
            debug!("No subscribers in {}", room);
            return Ok(());
        };
        match sender.send(notification.clone()) {
            Ok(receivers) => debug!("Pushed to {} ({} receivers)", room, receivers),
            Err(_) => {
                debug!("Last subscriber left {}, dropping the room", room);
                self.prune(room).await;
            }
        }
        Ok(())
    }
}
