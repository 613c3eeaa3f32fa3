use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use uuid::Uuid;

use huddle_types::Message;

/// Buffer between a backend's forwarder task and the session.
pub const STREAM_BUFFER: usize = 256;

/// Live "message inserted" events for one room.
///
/// Delivery is at-least-once with best-effort ordering, and the stream may
/// end without an error when the underlying channel drops. After
/// [`unsubscribe`](Self::unsubscribe) nothing more is yielded, including
/// messages already buffered.
pub struct InsertSubscription {
    room_id: Uuid,
    rx: mpsc::Receiver<Message>,
    forwarder: Option<JoinHandle<()>>,
    closed: bool,
}

impl InsertSubscription {
    /// Wrap a receiver fed by `forwarder`. The task is aborted on unsubscribe.
    pub fn new(room_id: Uuid, rx: mpsc::Receiver<Message>, forwarder: JoinHandle<()>) -> Self {
        Self {
            room_id,
            rx,
            forwarder: Some(forwarder),
            closed: false,
        }
    }

    /// A subscription fed directly through `tx`, with no forwarder task.
    pub fn channel(room_id: Uuid) -> (mpsc::Sender<Message>, Self) {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let sub = Self {
            room_id,
            rx,
            forwarder: None,
            closed: false,
        };
        (tx, sub)
    }

    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next insert for this room, or `None` once unsubscribed or dropped.
    pub async fn recv(&mut self) -> Option<Message> {
        while !self.closed {
            let Some(message) = self.rx.recv().await else {
                debug!("Insert stream for room {} ended", self.room_id);
                self.closed = true;
                break;
            };
            if message.room_id != self.room_id {
                trace!("Ignoring insert {} for room {}", message.id, message.room_id);
                continue;
            }
            return Some(message);
        }
        None
    }

    /// Stop all future deliveries. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        if !self.closed {
            debug!("Unsubscribed from inserts for room {}", self.room_id);
        }
        self.closed = true;
        self.rx.close();
    }
}

impl Drop for InsertSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
