//! Relay event payloads
//!
//! The relay groups clients by room and forwards each `audio-chunk` event to
//! the other members of the sender's room.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `join-room` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoom {
    pub room: String,
    pub name: String,
}

/// Outbound `audio-chunk` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundAudioChunk {
    pub room: String,
    /// base64 of little-endian PCM16, interleaved by channel
    pub data: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Inbound `audio-chunk` event as relayed by the server.
///
/// Senders that skip the wrapper object send the bare base64 string. The
/// sender id is only logged, so any JSON value is accepted for it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum InboundAudioChunk {
    Wrapped {
        #[serde(default)]
        sender: Option<Value>,
        #[serde(default)]
        data: Option<String>,
    },
    Bare(String),
}

impl InboundAudioChunk {
    /// Encoded payload, if any
    pub fn data(&self) -> Option<&str> {
        match self {
            Self::Wrapped { data, .. } => data.as_deref(),
            Self::Bare(data) => Some(data.as_str()),
        }
    }

    pub fn sender(&self) -> Option<&Value> {
        match self {
            Self::Wrapped { sender, .. } => sender.as_ref(),
            Self::Bare(_) => None,
        }
    }
}
