//! PeerFlow Signal Server
//!
//! Rendezvous and relay service for WebRTC-style connection setup.
//! Clients connect over WebSocket, register an identity, receive the
//! directory of other peers and exchange opaque signaling payloads.
//!
//! # Protocol
//!
//! 1. Client sends `register` with its `peerId` and optional metadata
//! 2. Server answers `registered` and broadcasts `peer-list` to everyone
//! 3. Peers send `signal` frames addressed by `targetPeer`; the server
//!    forwards them with `sourcePeer` filled in
//! 4. Clients send `heartbeat` to stay listed; silent peers are swept
//! 5. `goodbye` (or closing the socket) removes the peer

pub mod broadcast;
pub mod connections;
pub mod http;
pub mod hub;
pub mod messages;
pub mod registry;
pub mod server;
pub mod session;
pub mod sweeper;

pub use broadcast::BroadcastReport;
pub use connections::{ConnectionTable, Outbound, OutboundQueue, PeerHandle, SendError};
pub use hub::{HubStats, SignalHub};
pub use messages::{ClientFrame, FrameError, PeerEntry, RegisterInfo, ServerFrame};
pub use registry::{Peer, PeerRegistry};
pub use server::SignalServer;
pub use session::{Effect, Flow, SessionError, SessionState, SignalingSession};
pub use sweeper::spawn_sweeper;

pub use peerflow_core::{Config, DEFAULT_PORT};
