//! Peer directory: identity to metadata and liveness

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;

use crate::messages::{PeerEntry, STATUS_AVAILABLE};

/// Name used when `register` carries none
pub const DEFAULT_NAME: &str = "Unknown";

/// Device class used when `register` carries none
pub const DEFAULT_DEVICE_TYPE: &str = "desktop";

/// Current wall-clock time in UNIX seconds
pub fn now_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// A registered peer
#[derive(Clone, Debug, PartialEq)]
pub struct Peer {
    pub name: String,
    pub device_type: String,
    pub last_seen: f64,
}

/// Registered peers by identifier.
///
/// Each method takes the lock exactly once, so callers never observe a
/// half-applied update.
#[derive(Default)]
pub struct PeerRegistry {
    peers: Mutex<HashMap<String, Peer>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a peer and mark it seen at `now`
    pub fn upsert(&self, peer_id: &str, name: Option<&str>, device_type: Option<&str>, now: f64) {
        let mut peers = self.peers.lock();
        let last_seen = match peers.get(peer_id) {
            Some(existing) => existing.last_seen.max(now),
            None => now,
        };
        peers.insert(
            peer_id.to_string(),
            Peer {
                name: name.unwrap_or(DEFAULT_NAME).to_string(),
                device_type: device_type.unwrap_or(DEFAULT_DEVICE_TYPE).to_string(),
                last_seen,
            },
        );
    }

    /// Refresh `last_seen`; returns false if the peer is unknown
    pub fn touch(&self, peer_id: &str, now: f64) -> bool {
        match self.peers.lock().get_mut(peer_id) {
            Some(peer) => {
                peer.last_seen = peer.last_seen.max(now);
                true
            }
            None => false,
        }
    }

    /// Remove a peer; returns whether it was present
    pub fn remove(&self, peer_id: &str) -> bool {
        self.peers.lock().remove(peer_id).is_some()
    }

    /// Remove a peer only if it is still expired at `now`
    pub fn remove_if_expired(&self, peer_id: &str, now: f64, timeout_secs: u64) -> bool {
        let mut peers = self.peers.lock();
        match peers.get(peer_id) {
            Some(peer) if now - peer.last_seen > timeout_secs as f64 => {
                peers.remove(peer_id);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, peer_id: &str) -> Option<Peer> {
        self.peers.lock().get(peer_id).cloned()
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.lock().contains_key(peer_id)
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }

    /// Render every peer as a `peer-list` row, ordered by identifier
    pub fn snapshot(&self) -> Vec<PeerEntry> {
        let mut entries: Vec<PeerEntry> = self
            .peers
            .lock()
            .iter()
            .map(|(id, peer)| PeerEntry {
                id: id.clone(),
                name: peer.name.clone(),
                device_type: peer.device_type.clone(),
                status: STATUS_AVAILABLE.into(),
                last_seen: peer.last_seen,
            })
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    /// Identifiers silent for more than `timeout_secs` at `now`
    pub fn expired(&self, now: f64, timeout_secs: u64) -> Vec<String> {
        let timeout = timeout_secs as f64;
        self.peers
            .lock()
            .iter()
            .filter(|(_, peer)| now - peer.last_seen > timeout)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
