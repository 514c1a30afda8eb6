//! JSON wire encoding (§6): a human-readable object mirroring [`Packet`]
//! field-for-field, except that a [`Payload::Bytes`] payload is wrapped as
//! `{"__bytes__": "<base64>"}` since raw bytes aren't valid JSON text.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use chorus_types::{Packet, Payload, RpcEnvelope, Source};

use crate::error::{CodecError, MAX_PACKET_SIZE};

const BYTES_KEY: &str = "__bytes__";

#[derive(Serialize, Deserialize)]
struct WirePacketJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rpc: Option<RpcEnvelope>,
}

fn payload_to_wire(payload: Payload) -> Value {
    match payload {
        Payload::Value(v) => v,
        Payload::Bytes(b) => serde_json::json!({ BYTES_KEY: BASE64.encode(b) }),
    }
}

fn wire_to_payload(value: Value) -> Result<Payload, CodecError> {
    if let Value::Object(ref map) = value {
        if map.len() == 1 {
            if let Some(Value::String(encoded)) = map.get(BYTES_KEY) {
                let bytes = BASE64
                    .decode(encoded)
                    .map_err(|e| CodecError::Malformed(format!("invalid __bytes__: {e}")))?;
                return Ok(Payload::Bytes(bytes));
            }
        }
    }
    Ok(Payload::Value(value))
}

/// Encode a packet as a JSON string.
pub fn encode_json(packet: &Packet) -> Result<String, CodecError> {
    let wire = WirePacketJson {
        data: packet.data.clone().map(payload_to_wire),
        source: packet.source,
        channel: packet.channel.clone(),
        rpc: packet.rpc.clone(),
    };
    let text = serde_json::to_string(&wire)
        .map_err(|e| CodecError::Malformed(format!("failed to serialize packet: {e}")))?;
    if text.len() > MAX_PACKET_SIZE {
        return Err(CodecError::PayloadTooLarge {
            size: text.len(),
            max: MAX_PACKET_SIZE,
        });
    }
    Ok(text)
}

/// Decode a packet from a JSON string.
pub fn decode_json(text: &str) -> Result<Packet, CodecError> {
    if text.len() > MAX_PACKET_SIZE {
        return Err(CodecError::PayloadTooLarge {
            size: text.len(),
            max: MAX_PACKET_SIZE,
        });
    }
    let wire: WirePacketJson =
        serde_json::from_str(text).map_err(|e| CodecError::Malformed(e.to_string()))?;
    let data = match wire.data {
        Some(v) => Some(wire_to_payload(v)?),
        None => None,
    };
    Ok(Packet {
        data,
        source: wire.source,
        channel: wire.channel,
        rpc: wire.rpc,
    })
}
