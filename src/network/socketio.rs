//! Socket.IO v5 packet encoding
//!
//! Text form: `<type>[<namespace>,][<ack id>][<json payload>]`. The namespace
//! is omitted for the root namespace `/`.

use serde_json::Value;

use crate::error::NetworkError;

pub const ROOT_NAMESPACE: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl PacketKind {
    fn code(self) -> char {
        match self {
            Self::Connect => '0',
            Self::Disconnect => '1',
            Self::Event => '2',
            Self::Ack => '3',
            Self::ConnectError => '4',
            Self::BinaryEvent => '5',
            Self::BinaryAck => '6',
        }
    }

    fn from_code(code: char) -> Option<Self> {
        Some(match code {
            '0' => Self::Connect,
            '1' => Self::Disconnect,
            '2' => Self::Event,
            '3' => Self::Ack,
            '4' => Self::ConnectError,
            '5' => Self::BinaryEvent,
            '6' => Self::BinaryAck,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub kind: PacketKind,
    pub namespace: String,
    pub id: Option<u64>,
    pub data: Option<Value>,
}

impl Packet {
    pub fn connect(namespace: &str) -> Self {
        Self {
            kind: PacketKind::Connect,
            namespace: namespace.to_string(),
            id: None,
            data: None,
        }
    }

    pub fn disconnect(namespace: &str) -> Self {
        Self {
            kind: PacketKind::Disconnect,
            namespace: namespace.to_string(),
            id: None,
            data: None,
        }
    }

    /// Event packet `["<event>", payload]`
    pub fn event(namespace: &str, event: &str, payload: Value, id: Option<u64>) -> Self {
        Self {
            kind: PacketKind::Event,
            namespace: namespace.to_string(),
            id,
            data: Some(Value::Array(vec![Value::String(event.to_string()), payload])),
        }
    }

    pub fn ack(namespace: &str, id: u64, args: Vec<Value>) -> Self {
        Self {
            kind: PacketKind::Ack,
            namespace: namespace.to_string(),
            id: Some(id),
            data: Some(Value::Array(args)),
        }
    }

    /// Event name and first argument of an event packet
    pub fn event_parts(&self) -> Option<(&str, &Value)> {
        if self.kind != PacketKind::Event {
            return None;
        }
        let items = self.data.as_ref()?.as_array()?;
        let name = items.first()?.as_str()?;
        Some((name, items.get(1).unwrap_or(&Value::Null)))
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.kind.code());
        if self.namespace != ROOT_NAMESPACE && !self.namespace.is_empty() {
            out.push_str(&self.namespace);
            out.push(',');
        }
        if let Some(id) = self.id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }
        out
    }

    pub fn decode(text: &str) -> Result<Self, NetworkError> {
        let mut chars = text.chars();
        let code = chars
            .next()
            .ok_or_else(|| NetworkError::InvalidPacket("empty socket.io packet".into()))?;
        let kind = PacketKind::from_code(code).ok_or_else(|| {
            NetworkError::InvalidPacket(format!("unknown socket.io packet type '{}'", code))
        })?;
        if matches!(kind, PacketKind::BinaryEvent | PacketKind::BinaryAck) {
            return Err(NetworkError::InvalidPacket(
                "binary socket.io packets are not supported".into(),
            ));
        }

        let mut rest = chars.as_str();

        let namespace = if rest.starts_with('/') {
            let end = rest.find(',').unwrap_or(rest.len());
            let ns = &rest[..end];
            rest = rest.get(end + 1..).unwrap_or("");
            ns.to_string()
        } else {
            ROOT_NAMESPACE.to_string()
        };

        let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        let id = if digits > 0 {
            let id = rest[..digits]
                .parse()
                .map_err(|_| NetworkError::InvalidPacket("ack id out of range".into()))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest)?)
        };

        Ok(Self {
            kind,
            namespace,
            id,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_root_packets() {
        assert_eq!(Packet::connect(ROOT_NAMESPACE).encode(), "0");
        assert_eq!(Packet::disconnect(ROOT_NAMESPACE).encode(), "1");
        assert_eq!(
            Packet::event(ROOT_NAMESPACE, "join-room", json!({"room": "r"}), Some(12)).encode(),
            r#"212["join-room",{"room":"r"}]"#
        );
        assert_eq!(Packet::ack(ROOT_NAMESPACE, 3, vec![]).encode(), "33[]");
    }

    #[test]
    fn test_encode_custom_namespace() {
        assert_eq!(
            Packet::event("/audio", "x", Value::Null, None).encode(),
            r#"2/audio,["x",null]"#
        );
    }

    #[test]
    fn test_decode_connect_reply() {
        let packet = Packet::decode(r#"0{"sid":"abc"}"#).unwrap();
        assert_eq!(packet.kind, PacketKind::Connect);
        assert_eq!(packet.namespace, "/");
        assert_eq!(packet.data, Some(json!({"sid": "abc"})));
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack() {
        let packet = Packet::decode(r#"2/audio,7["audio-chunk",{"data":"AQA="}]"#).unwrap();
        assert_eq!(packet.namespace, "/audio");
        assert_eq!(packet.id, Some(7));
        let (name, payload) = packet.event_parts().unwrap();
        assert_eq!(name, "audio-chunk");
        assert_eq!(payload, &json!({"data": "AQA="}));
    }

    #[test]
    fn test_decode_ack_and_errors() {
        let ack = Packet::decode(r#"30[{"ok":true}]"#).unwrap();
        assert_eq!(ack.kind, PacketKind::Ack);
        assert_eq!(ack.id, Some(0));

        let err = Packet::decode(r#"4{"message":"nope"}"#).unwrap();
        assert_eq!(err.kind, PacketKind::ConnectError);

        assert!(Packet::decode("").is_err());
        assert!(Packet::decode("8").is_err());
        assert!(Packet::decode(r#"51-["x",{"_placeholder":true,"num":0}]"#).is_err());
    }

    #[test]
    fn test_event_without_payload() {
        let packet = Packet::decode(r#"2["ping-room"]"#).unwrap();
        let (name, payload) = packet.event_parts().unwrap();
        assert_eq!(name, "ping-room");
        assert!(payload.is_null());
    }
}
