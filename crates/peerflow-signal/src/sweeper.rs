//! Liveness sweep
//!
//! Evicts peers that have not sent `register` or `heartbeat` within the
//! timeout, closes their channels and rebroadcasts the directory.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::hub::SignalHub;
use crate::registry::now_secs;

impl SignalHub {
    /// Run one sweep cycle at `now`, returning the evicted identifiers.
    ///
    /// The directory is broadcast after every cycle, evictions or not.
    pub fn sweep(&self, now: f64) -> Vec<String> {
        let mut evicted = Vec::new();
        for peer_id in self.registry().expired(now, self.peer_timeout_secs()) {
            if self.evict_expired(&peer_id, now) {
                evicted.push(peer_id);
            }
        }

        self.broadcast_peer_list();
        evicted
    }

    /// Evict one peer if it is still expired at `now`.
    ///
    /// Only the channel bound before the expiry check is closed, so a peer
    /// that re-registers meanwhile keeps its fresh channel.
    pub fn evict_expired(&self, peer_id: &str, now: f64) -> bool {
        let bound = self.connections().get(peer_id);
        if !self
            .registry()
            .remove_if_expired(peer_id, now, self.peer_timeout_secs())
        {
            debug!("Peer {} refreshed before eviction", peer_id);
            return false;
        }

        if let Some(handle) = bound {
            self.connections().remove_if(peer_id, handle.id());
            if let Err(e) = handle.close() {
                warn!("Error closing channel for {}: {}", peer_id, e);
            }
        }
        info!("Removed inactive peer: {}", peer_id);
        true
    }
}

/// Spawn the periodic sweep; it runs until the runtime shuts down
pub fn spawn_sweeper(hub: Arc<SignalHub>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let evicted = hub.sweep(now_secs());
            debug!("Liveness sweep done ({} evicted)", evicted.len());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::Outbound;
    use crate::messages::ServerFrame;

    #[test]
    fn test_sweep_evicts_silent_peer() {
        let hub = SignalHub::default();
        let (quiet, quiet_queue) = hub.open_channel();
        let (chatty, mut chatty_queue) = hub.open_channel();
        hub.registry().upsert("quiet", None, None, 100.0);
        hub.registry().upsert("chatty", None, None, 100.0);
        hub.connections().put("quiet", quiet.clone());
        hub.connections().put("chatty", chatty);

        hub.registry().touch("chatty", 129.0);
        let evicted = hub.sweep(131.0);

        assert_eq!(evicted, vec!["quiet".to_string()]);
        assert!(!hub.registry().contains("quiet"));
        assert!(hub.connections().get("quiet").is_none());
        assert!(hub.registry().contains("chatty"));

        // the evicted channel was asked to close
        drop(quiet_queue);
        assert!(quiet.is_closed());

        match chatty_queue.try_next() {
            Some(Outbound::Text(text)) => match ServerFrame::from_json(&text).unwrap() {
                ServerFrame::PeerList { peers } => {
                    assert_eq!(peers.len(), 1);
                    assert_eq!(peers[0].id, "chatty");
                }
                other => panic!("unexpected frame {:?}", other),
            },
            other => panic!("expected peer list, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sweep_requests_close() {
        let hub = SignalHub::default();
        let (handle, mut queue) = hub.open_channel();
        hub.registry().upsert("a", None, None, 0.0);
        hub.connections().put("a", handle);

        hub.sweep(31.0);
        assert_eq!(queue.next().await, Some(Outbound::Close));
    }

    #[test]
    fn test_sweep_broadcasts_without_changes() {
        let hub = SignalHub::default();
        let (handle, mut queue) = hub.open_channel();
        hub.registry().upsert("a", None, None, 100.0);
        hub.connections().put("a", handle);

        assert!(hub.sweep(110.0).is_empty());
        assert!(matches!(queue.try_next(), Some(Outbound::Text(_))));
    }

    #[test]
    fn test_reconnected_peer_keeps_fresh_channel() {
        let hub = SignalHub::default();
        let (stale, _stale_queue) = hub.open_channel();
        let (fresh, _fresh_queue) = hub.open_channel();
        let fresh_id = fresh.id();
        hub.registry().upsert("a", None, None, 0.0);
        hub.connections().put("a", stale);

        let expired = hub.registry().expired(100.0, hub.peer_timeout_secs());
        assert_eq!(expired, vec!["a".to_string()]);

        // "a" reconnects between the scan and the eviction
        hub.registry().upsert("a", None, None, 100.0);
        hub.connections().put("a", fresh.clone());

        assert!(!hub.evict_expired("a", 100.0));
        assert!(hub.registry().contains("a"));
        assert!(hub.connections().is_bound_to("a", fresh_id));
        assert!(!fresh.is_closed());
    }

    #[test]
    fn test_heartbeats_keep_peer_alive() {
        let hub = SignalHub::default();
        hub.registry().upsert("a", None, None, 0.0);

        let mut now = 0.0;
        for _ in 0..10 {
            now += 29.0;
            hub.registry().touch("a", now);
            assert!(hub.sweep(now + 10.0).is_empty());
        }
        assert!(hub.registry().contains("a"));
    }
}
