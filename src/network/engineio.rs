//! Engine.IO v4 packet framing (WebSocket transport)
//!
//! Each WebSocket text frame carries exactly one packet: a single type digit
//! followed by the payload.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::NetworkError;

/// Engine.IO protocol revision spoken by the client
pub const PROTOCOL_VERSION: u8 = 4;

/// Handshake sent by the server in the open packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

impl Handshake {
    /// Longest silence tolerated before the connection is considered dead
    pub fn heartbeat_deadline(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self, NetworkError> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| NetworkError::InvalidPacket("empty engine.io frame".into()))?;
        let payload = chars.as_str();

        let packet = match kind {
            '0' => Self::Open(serde_json::from_str(payload)?),
            '1' => Self::Close,
            '2' => Self::Ping(payload.to_string()),
            '3' => Self::Pong(payload.to_string()),
            '4' => Self::Message(payload.to_string()),
            '5' => Self::Upgrade,
            '6' => Self::Noop,
            other => {
                return Err(NetworkError::InvalidPacket(format!(
                    "unknown engine.io packet type '{}'",
                    other
                )))
            }
        };
        Ok(packet)
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Open(handshake) => {
                // Handshake only holds strings and integers
                let json = serde_json::to_string(handshake).unwrap_or_default();
                format!("0{}", json)
            }
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{}", data),
            Self::Pong(data) => format!("3{}", data),
            Self::Message(data) => format!("4{}", data),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}
