//! Shared signaling state
//!
//! One [`SignalHub`] is shared by every session task, the liveness sweeper
//! and the HTTP endpoints.

use peerflow_core::Config;
use tracing::{debug, info};

use crate::connections::{ConnectionTable, OutboundQueue, PeerHandle};
use crate::registry::PeerRegistry;

/// Registry and connection table plus the limits that govern them
pub struct SignalHub {
    registry: PeerRegistry,
    connections: ConnectionTable,
    peer_timeout_secs: u64,
    outbound_queue: usize,
}

/// Directory sizes reported by the HTTP endpoints
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HubStats {
    pub peers: usize,
    pub connections: usize,
}

impl SignalHub {
    pub fn new(config: &Config) -> Self {
        Self {
            registry: PeerRegistry::new(),
            connections: ConnectionTable::new(),
            peer_timeout_secs: config.signal.peer_timeout_secs,
            outbound_queue: config.network.outbound_queue,
        }
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    pub fn peer_timeout_secs(&self) -> u64 {
        self.peer_timeout_secs
    }

    /// Allocate the handle and queue for a freshly accepted channel
    pub fn open_channel(&self) -> (PeerHandle, OutboundQueue) {
        PeerHandle::channel(self.outbound_queue)
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            peers: self.registry.len(),
            connections: self.connections.len(),
        }
    }

    /// Drop a peer whose channel `connection_id` failed and ask that
    /// channel to close.
    ///
    /// Nothing happens if the identifier has since been rebound to another
    /// channel.
    pub fn evict_dead(&self, peer_id: &str, connection_id: u64) -> bool {
        let handle = match self.connections.remove_if(peer_id, connection_id) {
            Some(handle) => handle,
            None => return false,
        };
        self.registry.remove(peer_id);
        if let Err(e) = handle.close() {
            debug!("Channel for {} already gone: {}", peer_id, e);
        }
        info!("Evicted unreachable peer {}", peer_id);
        true
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::{Outbound, SendError};

    #[test]
    fn test_hub_creation() {
        let hub = SignalHub::default();
        assert_eq!(
            hub.stats(),
            HubStats {
                peers: 0,
                connections: 0
            }
        );
        assert_eq!(hub.peer_timeout_secs(), 30);
    }

    #[test]
    fn test_evict_dead_skips_rebound_peer() {
        let hub = SignalHub::default();
        let (old, _q1) = hub.open_channel();
        let (new, _q2) = hub.open_channel();
        let old_id = old.id();

        hub.registry().upsert("a", None, None, 1.0);
        hub.connections().put("a", new);

        assert!(!hub.evict_dead("a", old_id));
        assert_eq!(hub.stats().peers, 1);
        assert_eq!(hub.stats().connections, 1);
    }

    #[tokio::test]
    async fn test_evict_dead_closes_full_channel() {
        let config = {
            let mut config = Config::default();
            config.network.outbound_queue = 1;
            config
        };
        let hub = SignalHub::new(&config);
        let (handle, mut queue) = hub.open_channel();
        let id = handle.id();
        hub.registry().upsert("a", None, None, 1.0);
        hub.connections().put("a", handle.clone());

        handle.send_text("backlog".into()).unwrap();
        assert_eq!(handle.send_text("more".into()), Err(SendError::Full));

        assert!(hub.evict_dead("a", id));
        assert!(!hub.registry().contains("a"));
        assert!(hub.connections().get("a").is_none());

        // the writer is told to close ahead of the backlog
        assert_eq!(queue.next().await, Some(Outbound::Close));
        drop(queue);
        assert!(handle.is_closed());
    }
}
