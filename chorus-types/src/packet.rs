//! The packet — the framework's unit of application-level message (§3).
//!
//! A [`Packet`] is deliberately codec-agnostic: it carries [`Payload`] in its
//! native Rust shape. Wire-format concerns (base64-wrapping raw bytes for the
//! JSON variant, length-prefixing for the binary variant) live in
//! `chorus-codec`, which converts to and from this type.

use serde::{Deserialize, Serialize};

use crate::error::TypesError;
use crate::rpc::RpcEnvelope;

/// Origin of a packet. Carried on the wire as the small integer from §6.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Source {
    Client = 1,
    Server = 2,
    Channel = 3,
    Broadcast = 4,
    Rpc = 5,
}

impl From<Source> for u8 {
    fn from(source: Source) -> u8 {
        source as u8
    }
}

impl TryFrom<u8> for Source {
    type Error = TypesError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Source::Client),
            2 => Ok(Source::Server),
            3 => Ok(Source::Channel),
            4 => Ok(Source::Broadcast),
            5 => Ok(Source::Rpc),
            other => Err(TypesError::UnknownSource(other)),
        }
    }
}

/// The body of a packet: either an arbitrary JSON-serializable value, or a
/// raw byte string. Exactly one applies at a time — there is no packet that
/// is simultaneously both.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Value(serde_json::Value),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Value(v) => Some(v),
            Payload::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Bytes(b) => Some(b),
            Payload::Value(_) => None,
        }
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Value(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Value(serde_json::Value::String(s))
    }
}

/// The unit of application-level message exchanged over a connection.
///
/// Invariant: `data` and `rpc` are not both meaningful for the same packet —
/// an RPC packet carries its payload inside `rpc`, and `data` is unused.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Payload>,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc: Option<RpcEnvelope>,
}

impl Packet {
    /// Wrap a raw payload (string, bytes, or JSON value) with the given source.
    /// This is what `Connection::send` does for non-`Packet` arguments (§4.4).
    pub fn plain(source: Source, payload: impl Into<Payload>) -> Self {
        Self {
            data: Some(payload.into()),
            source,
            channel: None,
            rpc: None,
        }
    }

    /// Build a channel-delivery packet (§4.5): tagged with the channel name
    /// and `source = Channel`.
    pub fn for_channel(channel: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            data: Some(payload.into()),
            source: Source::Channel,
            channel: Some(channel.into()),
            rpc: None,
        }
    }

    /// Build a broadcast packet (§4.5): `source = Broadcast`, no channel tag.
    pub fn for_broadcast(payload: impl Into<Payload>) -> Self {
        Self {
            data: Some(payload.into()),
            source: Source::Broadcast,
            channel: None,
            rpc: None,
        }
    }

    /// Build an RPC-carrying packet; `source` is always `Rpc` per §6.
    pub fn for_rpc(envelope: RpcEnvelope) -> Self {
        Self {
            data: None,
            source: Source::Rpc,
            channel: None,
            rpc: Some(envelope),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_roundtrips_through_u8() {
        for source in [
            Source::Client,
            Source::Server,
            Source::Channel,
            Source::Broadcast,
            Source::Rpc,
        ] {
            let n: u8 = source.into();
            assert_eq!(Source::try_from(n).unwrap(), source);
        }
    }

    #[test]
    fn unknown_source_discriminant_is_rejected() {
        assert!(matches!(
            Source::try_from(9),
            Err(TypesError::UnknownSource(9))
        ));
    }

    #[test]
    fn plain_packet_carries_no_rpc_or_channel() {
        let p = Packet::plain(Source::Server, "hello".to_string());
        assert_eq!(p.source, Source::Server);
        assert!(p.channel.is_none());
        assert!(p.rpc.is_none());
        assert_eq!(p.data.unwrap().as_value().unwrap(), "hello");
    }

    #[test]
    fn channel_packet_tags_channel_and_source() {
        let p = Packet::for_channel("room1", serde_json::json!("hi"));
        assert_eq!(p.source, Source::Channel);
        assert_eq!(p.channel.as_deref(), Some("room1"));
    }
}
