use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

/// Frames queued per connection before broadcasts to it start being dropped.
const FRAME_QUEUE_CAPACITY: usize = 16;

pub type ConnId = u64;

/// Open websocket connections, each reachable through its outbound frame queue.
#[derive(Debug, Default)]
pub struct SocketRegistry {
    next_id: ConnId,
    sockets: HashMap<ConnId, mpsc::Sender<Bytes>>,
}

impl SocketRegistry {
    pub fn new() -> Self {
        SocketRegistry {
            next_id: 0,
            sockets: HashMap::new(),
        }
    }

    pub fn register(&mut self) -> (ConnId, mpsc::Receiver<Bytes>) {
        // ensure the id is unique
        let id = loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if !self.sockets.contains_key(&id) {
                break id;
            }
        };

        let (tx, rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
        self.sockets.insert(id, tx);

        (id, rx)
    }

    pub fn unregister(&mut self, id: ConnId) -> bool {
        self.sockets.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    /// Queue `frame` on every open connection, best effort. Returns how many
    /// connections accepted it; a full or closed queue is skipped silently.
    pub fn broadcast(&self, frame: &Bytes) -> usize {
        let mut delivered = 0;
        for (id, tx) in &self.sockets {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => trace!(conn_id = id, "frame queue full, dropped"),
                Err(TrySendError::Closed(_)) => trace!(conn_id = id, "connection gone, dropped"),
            }
        }
        delivered
    }
}
