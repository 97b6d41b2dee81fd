//! Live channel handles by peer identifier

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Frames queued for a channel's writer task
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

/// Why a frame could not be queued
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("outbound queue full")]
    Full,

    #[error("channel closed")]
    Closed,
}

/// Sending side of one live channel.
///
/// Cloning shares the same queue; `id` tells channels apart when the same
/// peer identifier is reused by a reconnect.
#[derive(Clone, Debug)]
pub struct PeerHandle {
    id: u64,
    tx: mpsc::Sender<Outbound>,
    shutdown: Arc<Notify>,
}

/// Receiving side drained by the channel's writer task
#[derive(Debug)]
pub struct OutboundQueue {
    rx: mpsc::Receiver<Outbound>,
    shutdown: Arc<Notify>,
}

impl PeerHandle {
    /// Create a handle with room for `capacity` queued frames
    pub fn channel(capacity: usize) -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shutdown = Arc::new(Notify::new());
        let handle = Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            tx,
            shutdown: shutdown.clone(),
        };
        (handle, OutboundQueue { rx, shutdown })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue a text frame without waiting
    pub fn send_text(&self, text: String) -> Result<(), SendError> {
        self.tx.try_send(Outbound::Text(text)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Ask the writer to send a close frame and stop.
    ///
    /// Jumps ahead of any frames still queued.
    pub fn close(&self) -> Result<(), SendError> {
        if self.tx.is_closed() {
            return Err(SendError::Closed);
        }
        self.shutdown.notify_one();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the writer side has gone away
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

impl OutboundQueue {
    /// Next frame to write; `None` once every handle is dropped
    pub async fn next(&mut self) -> Option<Outbound> {
        tokio::select! {
            biased;
            _ = self.shutdown.notified() => Some(Outbound::Close),
            frame = self.rx.recv() => frame,
        }
    }

    /// Queued frame if one is ready, ignoring pending close requests
    pub fn try_next(&mut self) -> Option<Outbound> {
        self.rx.try_recv().ok()
    }
}

/// Live channels by peer identifier.
///
/// Each method takes the lock exactly once.
#[derive(Default)]
pub struct ConnectionTable {
    handles: Mutex<HashMap<String, PeerHandle>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `peer_id` to `handle`, returning the handle it replaced
    pub fn put(&self, peer_id: &str, handle: PeerHandle) -> Option<PeerHandle> {
        self.handles.lock().insert(peer_id.to_string(), handle)
    }

    pub fn get(&self, peer_id: &str) -> Option<PeerHandle> {
        self.handles.lock().get(peer_id).cloned()
    }

    pub fn remove(&self, peer_id: &str) -> Option<PeerHandle> {
        self.handles.lock().remove(peer_id)
    }

    /// Remove `peer_id` only while it is still bound to connection `id`
    pub fn remove_if(&self, peer_id: &str, id: u64) -> Option<PeerHandle> {
        let mut handles = self.handles.lock();
        if handles.get(peer_id).map(|h| h.id) == Some(id) {
            handles.remove(peer_id)
        } else {
            None
        }
    }

    /// Whether `peer_id` is bound to connection `id`
    pub fn is_bound_to(&self, peer_id: &str, id: u64) -> bool {
        self.handles.lock().get(peer_id).map(|h| h.id) == Some(id)
    }

    /// Whether `peer_id` is unbound or bound to connection `id`
    pub fn is_unbound_or(&self, peer_id: &str, id: u64) -> bool {
        self.handles
            .lock()
            .get(peer_id)
            .map_or(true, |h| h.id == id)
    }

    /// Visit a snapshot of the current entries.
    ///
    /// The lock is released before `f` runs, so `f` may mutate the table.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &PeerHandle),
    {
        let entries: Vec<(String, PeerHandle)> = self
            .handles
            .lock()
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect();

        for (peer_id, handle) in &entries {
            f(peer_id, handle);
        }
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_overwrites() {
        let table = ConnectionTable::new();
        let (first, _q1) = PeerHandle::channel(4);
        let (second, _q2) = PeerHandle::channel(4);
        let first_id = first.id();
        let second_id = second.id();

        assert!(table.put("a", first).is_none());
        let replaced = table.put("a", second).unwrap();

        assert_eq!(replaced.id(), first_id);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("a").unwrap().id(), second_id);
    }

    #[test]
    fn test_remove_if_respects_owner() {
        let table = ConnectionTable::new();
        let (old, _q1) = PeerHandle::channel(4);
        let (new, _q2) = PeerHandle::channel(4);
        let old_id = old.id();
        let new_id = new.id();

        table.put("a", new);
        assert!(table.remove_if("a", old_id).is_none());
        assert!(!table.is_unbound_or("a", old_id));
        assert!(!table.is_bound_to("a", old_id));
        assert!(table.is_bound_to("a", new_id));
        assert!(table.is_unbound_or("a", new_id));
        assert_eq!(table.remove_if("a", new_id).map(|h| h.id()), Some(new_id));
        assert!(table.is_empty());
        assert!(table.is_unbound_or("a", old_id));
    }

    #[test]
    fn test_for_each_allows_removal() {
        let table = ConnectionTable::new();
        let mut queues = Vec::new();
        for id in ["a", "b", "c"] {
            let (handle, queue) = PeerHandle::channel(4);
            table.put(id, handle);
            queues.push(queue);
        }

        let mut visited = Vec::new();
        table.for_each(|peer_id, _| {
            visited.push(peer_id.to_string());
            table.remove(peer_id);
        });

        visited.sort();
        assert_eq!(visited, vec!["a", "b", "c"]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_send_full_and_closed() {
        let (handle, queue) = PeerHandle::channel(1);
        assert!(handle.send_text("one".into()).is_ok());
        assert_eq!(handle.send_text("two".into()), Err(SendError::Full));

        drop(queue);
        assert!(handle.is_closed());
        assert_eq!(handle.send_text("three".into()), Err(SendError::Closed));
        assert_eq!(handle.close(), Err(SendError::Closed));
    }

    #[tokio::test]
    async fn test_close_preempts_queue() {
        let (handle, mut queue) = PeerHandle::channel(4);
        handle.send_text("hello".into()).unwrap();
        handle.close().unwrap();

        assert_eq!(queue.next().await, Some(Outbound::Close));
        assert_eq!(queue.next().await, Some(Outbound::Text("hello".into())));
    }

    #[tokio::test]
    async fn test_closed_resolves_when_queue_dropped() {
        let (handle, queue) = PeerHandle::channel(4);
        drop(queue);
        handle.closed().await;
        assert!(handle.is_closed());
    }
}
