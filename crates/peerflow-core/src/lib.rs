//! PeerFlow Core - shared configuration and constants
//!
//! Used by the signal server and any tooling that needs to read the same
//! configuration file. It has no networking code.

pub mod config;
pub mod error;

pub use config::{Config, NetworkConfig, SignalConfig};
pub use error::ConfigError;

/// Default signal server port
pub const DEFAULT_PORT: u16 = 8000;

/// Default WebSocket endpoint path
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Seconds of silence after which a peer is evicted
pub const DEFAULT_PEER_TIMEOUT_SECS: u64 = 30;

/// Seconds between liveness sweeps
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10;

/// Outbound frames buffered per channel before sends start failing
pub const DEFAULT_OUTBOUND_QUEUE: usize = 64;
