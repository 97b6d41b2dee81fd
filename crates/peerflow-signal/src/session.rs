//! Per-channel signaling session
//!
//! [`SessionState::on_frame`] is a pure transition: it turns one decoded
//! frame into the next state plus a list of [`Effect`]s. [`SignalingSession`]
//! applies those effects to the shared [`SignalHub`].

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::connections::{PeerHandle, SendError};
use crate::hub::SignalHub;
use crate::messages::{ClientFrame, ServerFrame, MISSING_PEER_ID};
use crate::registry::now_secs;

/// Where a channel is in its lifecycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Channel open, no identity yet
    Connected,
    /// Identity bound
    Registered { peer_id: String },
    /// Terminal
    Closed,
}

/// Side effects requested by a transition
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Send a frame back on this channel
    Reply(ServerFrame),
    /// Upsert the peer and bind this channel to it, releasing `previous`
    Bind {
        peer_id: String,
        name: Option<String>,
        device_type: Option<String>,
        previous: Option<String>,
    },
    /// Forward a frame to another peer's channel if it is connected
    Relay { target: String, frame: ServerFrame },
    /// Refresh liveness
    Touch { peer_id: String },
    /// Remove the peer from both tables
    Depart { peer_id: String },
    /// Push the directory to everyone
    Broadcast,
    /// End the session
    Close,
}

impl SessionState {
    pub fn peer_id(&self) -> Option<&str> {
        match self {
            SessionState::Registered { peer_id } => Some(peer_id),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    /// Compute the next state and effects for one frame
    pub fn on_frame(&self, frame: ClientFrame) -> (SessionState, Vec<Effect>) {
        if self.is_closed() {
            return (SessionState::Closed, Vec::new());
        }

        match frame {
            ClientFrame::Register { peer_id, info } => {
                let peer_id = match peer_id.filter(|id| !id.is_empty()) {
                    Some(id) => id,
                    None => {
                        return (
                            self.clone(),
                            vec![Effect::Reply(ServerFrame::error(MISSING_PEER_ID))],
                        );
                    }
                };
                let info = info.unwrap_or_default();
                let previous = self
                    .peer_id()
                    .filter(|old| *old != peer_id)
                    .map(str::to_string);

                (
                    SessionState::Registered {
                        peer_id: peer_id.clone(),
                    },
                    vec![
                        Effect::Bind {
                            peer_id: peer_id.clone(),
                            name: info.name,
                            device_type: info.device_type,
                            previous,
                        },
                        Effect::Reply(ServerFrame::registered(peer_id)),
                        Effect::Broadcast,
                    ],
                )
            }

            ClientFrame::Signal {
                target_peer,
                signal,
            } => {
                let effects = match (self.peer_id(), target_peer) {
                    (Some(me), Some(target)) if !target.is_empty() => vec![Effect::Relay {
                        target,
                        frame: ServerFrame::Signal {
                            source_peer: me.to_string(),
                            signal,
                        },
                    }],
                    _ => Vec::new(),
                };
                (self.clone(), effects)
            }

            ClientFrame::Heartbeat {} => {
                let effects = match self.peer_id() {
                    Some(me) => vec![Effect::Touch {
                        peer_id: me.to_string(),
                    }],
                    None => Vec::new(),
                };
                (self.clone(), effects)
            }

            ClientFrame::Goodbye {} => match self.peer_id() {
                Some(me) => (
                    SessionState::Closed,
                    vec![
                        Effect::Depart {
                            peer_id: me.to_string(),
                        },
                        Effect::Broadcast,
                        Effect::Close,
                    ],
                ),
                None => (self.clone(), Vec::new()),
            },
        }
    }
}

/// Whether the receive loop should keep going
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Failure while applying one effect
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("send to {peer_id} failed: {source}")]
    Send { peer_id: String, source: SendError },
}

/// One accepted channel and its protocol state
pub struct SignalingSession {
    hub: Arc<SignalHub>,
    handle: PeerHandle,
    state: SessionState,
}

impl SignalingSession {
    pub fn new(hub: Arc<SignalHub>, handle: PeerHandle) -> Self {
        Self {
            hub,
            handle,
            state: SessionState::Connected,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Handle one text frame received on the channel.
    ///
    /// Malformed frames are dropped and failures are logged; neither ends
    /// the session.
    pub fn handle_text(&mut self, text: &str) -> Flow {
        let frame = match ClientFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Dropping malformed frame: {}", e);
                return Flow::Continue;
            }
        };

        let (next, effects) = self.state.on_frame(frame);
        self.state = next;

        let mut flow = Flow::Continue;
        for effect in effects {
            if matches!(effect, Effect::Close) {
                flow = Flow::Stop;
                continue;
            }
            if let Err(e) = self.apply(effect) {
                warn!("Error processing message: {}", e);
            }
        }
        flow
    }

    fn apply(&self, effect: Effect) -> Result<(), SessionError> {
        match effect {
            Effect::Reply(frame) => {
                self.handle
                    .send_text(frame.to_json()?)
                    .map_err(|source| SessionError::Send {
                        peer_id: self.state.peer_id().unwrap_or("unregistered").to_string(),
                        source,
                    })
            }

            Effect::Bind {
                peer_id,
                name,
                device_type,
                previous,
            } => {
                if let Some(old) = previous {
                    self.release(&old);
                }
                self.hub
                    .registry()
                    .upsert(&peer_id, name.as_deref(), device_type.as_deref(), now_secs());
                self.hub.connections().put(&peer_id, self.handle.clone());
                info!("Registered peer: {}", peer_id);
                Ok(())
            }

            Effect::Relay { target, frame } => {
                if !self.owns_identity() {
                    debug!("Dropping signal from evicted channel {}", self.handle.id());
                    return Ok(());
                }
                let handle = match self.hub.connections().get(&target) {
                    Some(handle) => handle,
                    None => {
                        debug!("Dropping signal for unknown peer {}", target);
                        return Ok(());
                    }
                };
                if let Err(source) = handle.send_text(frame.to_json()?) {
                    if self.hub.evict_dead(&target, handle.id()) {
                        self.hub.broadcast_peer_list();
                    }
                    return Err(SessionError::Send {
                        peer_id: target,
                        source,
                    });
                }
                Ok(())
            }

            Effect::Touch { peer_id } => {
                if self.hub.connections().is_bound_to(&peer_id, self.handle.id()) {
                    self.hub.registry().touch(&peer_id, now_secs());
                }
                Ok(())
            }

            Effect::Depart { peer_id } => {
                if self.release(&peer_id) {
                    info!("Peer {} said goodbye", peer_id);
                } else {
                    debug!("Ignoring goodbye for {} from a replaced channel", peer_id);
                }
                Ok(())
            }

            Effect::Broadcast => {
                self.hub.broadcast_peer_list();
                Ok(())
            }

            Effect::Close => Ok(()),
        }
    }

    /// Whether this channel is still the one bound to its identifier
    fn owns_identity(&self) -> bool {
        self.state
            .peer_id()
            .map_or(false, |me| self.hub.connections().is_bound_to(me, self.handle.id()))
    }

    /// Drop `peer_id` from both tables unless another channel now owns it.
    ///
    /// Returns whether a registry entry was actually removed.
    fn release(&self, peer_id: &str) -> bool {
        let connections = self.hub.connections();
        if !connections.is_unbound_or(peer_id, self.handle.id()) {
            return false;
        }
        let removed = self.hub.registry().remove(peer_id);
        connections.remove_if(peer_id, self.handle.id());
        removed
    }

    /// Tear down after the channel closed or failed
    pub fn finish(mut self) {
        let state = std::mem::replace(&mut self.state, SessionState::Closed);
        if let SessionState::Registered { peer_id } = state {
            if self.release(&peer_id) {
                self.hub.broadcast_peer_list();
                info!("Cleaned up connection for peer: {}", peer_id);
            } else {
                debug!("Peer {} already gone or rebound, nothing to clean", peer_id);
            }
        }
        let _ = self.handle.close();
    }
}
