use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::trace;
use uuid::Uuid;

use huddle_types::events::GatewayEvent;

/// Capacity of the broadcast ring. A receiver that falls further behind
/// than this sees `Lagged` and skips ahead; clients recover via polling.
const BROADCAST_CAPACITY: usize = 1024;

/// Fans out room events to every gateway connection and in-process listener.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every listener receives every event and filters by room itself.
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Room subscriptions of live WebSocket connections: conn_id -> room_ids
    connections: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event. Returns how many receivers were listening.
    pub fn broadcast(&self, event: GatewayEvent) -> usize {
        let room_id = event.room_id();
        let receivers = self.inner.broadcast_tx.send(event).unwrap_or(0);
        trace!("Broadcast event for room {:?} to {} receivers", room_id, receivers);
        receivers
    }

    /// Register a new WebSocket connection. Returns its conn_id.
    pub async fn register_connection(&self) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.inner
            .connections
            .write()
            .await
            .insert(conn_id, HashSet::new());
        conn_id
    }

    pub async fn unregister_connection(&self, conn_id: Uuid) {
        self.inner.connections.write().await.remove(&conn_id);
    }

    /// Replace the room subscriptions of a registered connection.
    pub async fn set_subscriptions(&self, conn_id: Uuid, room_ids: &[Uuid]) {
        if let Some(rooms) = self.inner.connections.write().await.get_mut(&conn_id) {
            *rooms = room_ids.iter().copied().collect();
        }
    }

    /// Whether a connection has asked for events of `room_id`.
    pub async fn is_subscribed(&self, conn_id: Uuid, room_id: Uuid) -> bool {
        self.inner
            .connections
            .read()
            .await
            .get(&conn_id)
            .is_some_and(|rooms| rooms.contains(&room_id))
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}
