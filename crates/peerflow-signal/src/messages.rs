//! Signal protocol messages
//!
//! Every frame is a JSON object whose `type` field selects the variant.
//! Signal payloads are carried as raw [`serde_json::Value`] and never
//! inspected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Status reported for every listed peer
pub const STATUS_AVAILABLE: &str = "available";

/// Confirmation text sent with `registered`
pub const REGISTERED_MESSAGE: &str = "Registration successful";

/// Error text sent when `register` has no usable `peerId`
pub const MISSING_PEER_ID: &str = "Missing peerId in registration";

/// `type` values accepted from clients
pub const CLIENT_FRAME_TYPES: [&str; 4] = ["register", "signal", "heartbeat", "goodbye"];

/// Why a client frame could not be decoded
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("frame has no type")]
    MissingType,

    #[error("unknown frame type: {0}")]
    UnknownType(String),

    #[error("invalid {kind} frame: {source}")]
    Invalid {
        kind: String,
        source: serde_json::Error,
    },
}

/// Frames sent by clients
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// Bind an identity to this channel
    #[serde(rename_all = "camelCase")]
    Register {
        #[serde(default)]
        peer_id: Option<String>,
        #[serde(default)]
        info: Option<RegisterInfo>,
    },

    /// Relay a payload to another peer
    #[serde(rename_all = "camelCase")]
    Signal {
        #[serde(default)]
        target_peer: Option<String>,
        #[serde(default)]
        signal: Value,
    },

    /// Keep the registration alive
    Heartbeat {},

    /// Leave the directory and close the channel
    Goodbye {},
}

/// Optional metadata supplied with `register`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
}

/// Frames sent by the server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerFrame {
    /// Registration accepted
    #[serde(rename_all = "camelCase")]
    Registered { peer_id: String, message: String },

    /// Request rejected
    Error { message: String },

    /// Full directory snapshot
    PeerList { peers: Vec<PeerEntry> },

    /// Relayed payload from another peer
    #[serde(rename_all = "camelCase")]
    Signal { source_peer: String, signal: Value },
}

/// One row of a `peer-list` frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerEntry {
    pub id: String,
    pub name: String,
    pub device_type: String,
    pub status: String,
    /// UNIX seconds of the last register/heartbeat
    pub last_seen: f64,
}

impl ClientFrame {
    /// Decode a text frame, classifying what was wrong with it
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text).map_err(FrameError::Json)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingType)?
            .to_string();
        if !CLIENT_FRAME_TYPES.contains(&kind.as_str()) {
            return Err(FrameError::UnknownType(kind));
        }
        serde_json::from_value(value).map_err(|source| FrameError::Invalid { kind, source })
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerFrame {
    /// Create an error frame
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Create a registration confirmation
    pub fn registered(peer_id: impl Into<String>) -> Self {
        Self::Registered {
            peer_id: peer_id.into(),
            message: REGISTERED_MESSAGE.into(),
        }
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
