use crate::gateway::protocol::GatewayEvent;
use dashmap::DashMap;
use tokio::sync::mpsc;

struct ClientHandle {
    user_id: String,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

/// Fans events out to connected WebSocket clients, scoped per user
pub struct EventBroadcaster {
    clients: DashMap<String, ClientHandle>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Register a client for a user, returning its id and event receiver
    pub fn subscribe(&self, user_id: &str) -> (String, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client_id = uuid::Uuid::new_v4().to_string();
        self.clients.insert(
            client_id.clone(),
            ClientHandle {
                user_id: user_id.to_string(),
                tx,
            },
        );
        log::debug!("Gateway client {} subscribed for user {}", client_id, user_id);
        (client_id, rx)
    }

    pub fn unsubscribe(&self, client_id: &str) {
        if self.clients.remove(client_id).is_some() {
            log::debug!("Gateway client {} unsubscribed", client_id);
        }
    }

    /// Deliver an event to every client of `user_id`. Returns the number of
    /// clients reached; clients whose receiver is gone are dropped.
    pub fn send_to_user(&self, user_id: &str, event: GatewayEvent) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for entry in self.clients.iter() {
            if entry.user_id != user_id {
                continue;
            }
            if entry.tx.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(entry.key().clone());
            }
        }

        // Removal must happen after the iterator guard is released
        for client_id in closed {
            self.clients.remove(&client_id);
        }

        delivered
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_only_reach_owner() {
        let broadcaster = EventBroadcaster::new();
        let (_alice_id, mut alice_rx) = broadcaster.subscribe("alice");
        let (_bob_id, mut bob_rx) = broadcaster.subscribe("bob");

        let delivered = broadcaster.send_to_user("alice", GatewayEvent::instance_qr("inst-1", "qr-data"));
        assert_eq!(delivered, 1);

        let event = alice_rx.recv().await.unwrap();
        assert_eq!(event.event, "instance.qr");
        assert!(bob_rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_clients_are_pruned() {
        let broadcaster = EventBroadcaster::new();
        let (_id, rx) = broadcaster.subscribe("alice");
        drop(rx);

        assert_eq!(broadcaster.send_to_user("alice", GatewayEvent::instance_qr("i", "q")), 0);
        assert_eq!(broadcaster.client_count(), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let broadcaster = EventBroadcaster::new();
        let (id, _rx) = broadcaster.subscribe("alice");
        broadcaster.unsubscribe(&id);
        assert_eq!(broadcaster.client_count(), 0);
    }
}
