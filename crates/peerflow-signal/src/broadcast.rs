//! Peer directory broadcast

use tracing::{debug, warn};

use crate::hub::SignalHub;
use crate::messages::ServerFrame;

/// Outcome of one broadcast pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub pruned: Vec<String>,
}

impl SignalHub {
    /// Push the current `peer-list` to every live channel.
    ///
    /// The frame is rendered once. Channels that cannot take it are evicted
    /// from both tables during the same pass. Sends never wait: a peer whose
    /// queue is full counts as dead.
    pub fn broadcast_peer_list(&self) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        let frame = ServerFrame::PeerList {
            peers: self.registry().snapshot(),
        };
        let json = match frame.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode peer list: {}", e);
                return report;
            }
        };

        self.connections().for_each(|peer_id, handle| {
            match handle.send_text(json.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Error broadcasting to {}: {}", peer_id, e);
                    if self.evict_dead(peer_id, handle.id()) {
                        report.pruned.push(peer_id.to_string());
                    }
                }
            }
        });

        debug!(
            "Broadcast peer list to {} channels ({} pruned)",
            report.delivered,
            report.pruned.len()
        );
        report
    }
}
