//! Binary wire encoding (§4.1): a one-byte format version followed by a
//! `bincode` frame of the packet, native byte payloads included unmodified
//! (no base64 detour, unlike [`crate::json`]).
//!
//! `bincode` is not self-describing: it can't deserialize `serde_json::Value`
//! (or anything else whose `Deserialize` impl calls `deserialize_any`)
//! directly. Every `Value`-bearing field — the plain payload, and an RPC
//! envelope's `args`/`kwargs`/`response` — is carried as a JSON-encoded byte
//! string inside the bincode frame instead, so it stays self-describing at
//! the one layer that needs it while the rest of the frame is plain bincode.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use chorus_types::{ErrorCode, Packet, Payload, RpcEnvelope, Source};

use crate::error::{CodecError, MAX_PACKET_SIZE};

/// Bumped whenever the binary frame layout changes incompatibly.
pub const BINARY_FORMAT_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
enum WirePayload {
    Json(Vec<u8>),
    Bytes(Vec<u8>),
}

#[derive(Serialize, Deserialize)]
enum WireRpcEnvelope {
    Request {
        call_id: String,
        method: String,
        /// JSON-encoded `Vec<Value>`.
        args: Vec<u8>,
        /// JSON-encoded `Map<String, Value>`.
        kwargs: Vec<u8>,
    },
    Response {
        call_id: String,
        /// JSON-encoded `Value`.
        response: Vec<u8>,
        error: Option<ErrorCode>,
    },
}

#[derive(Serialize, Deserialize)]
struct WirePacket {
    data: Option<WirePayload>,
    source: Source,
    channel: Option<String>,
    rpc: Option<WireRpcEnvelope>,
}

fn to_json_bytes(value: &impl Serialize) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(|e| CodecError::Malformed(format!("failed to serialize packet: {e}")))
}

fn from_json_bytes<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))
}

fn payload_to_wire(payload: Payload) -> Result<WirePayload, CodecError> {
    Ok(match payload {
        Payload::Value(v) => WirePayload::Json(to_json_bytes(&v)?),
        Payload::Bytes(b) => WirePayload::Bytes(b),
    })
}

fn wire_to_payload(wire: WirePayload) -> Result<Payload, CodecError> {
    Ok(match wire {
        WirePayload::Json(bytes) => Payload::Value(from_json_bytes(&bytes)?),
        WirePayload::Bytes(b) => Payload::Bytes(b),
    })
}

fn rpc_to_wire(envelope: RpcEnvelope) -> Result<WireRpcEnvelope, CodecError> {
    Ok(match envelope {
        RpcEnvelope::Request {
            call_id,
            method,
            args,
            kwargs,
        } => WireRpcEnvelope::Request {
            call_id,
            method,
            args: to_json_bytes(&args)?,
            kwargs: to_json_bytes(&kwargs)?,
        },
        RpcEnvelope::Response {
            call_id,
            response,
            error,
        } => WireRpcEnvelope::Response {
            call_id,
            response: to_json_bytes(&response)?,
            error,
        },
    })
}

fn wire_to_rpc(wire: WireRpcEnvelope) -> Result<RpcEnvelope, CodecError> {
    Ok(match wire {
        WireRpcEnvelope::Request {
            call_id,
            method,
            args,
            kwargs,
        } => RpcEnvelope::Request {
            call_id,
            method,
            args: from_json_bytes::<Vec<Value>>(&args)?,
            kwargs: from_json_bytes::<Map<String, Value>>(&kwargs)?,
        },
        WireRpcEnvelope::Response {
            call_id,
            response,
            error,
        } => RpcEnvelope::Response {
            call_id,
            response: from_json_bytes::<Value>(&response)?,
            error,
        },
    })
}

/// Encode a packet as a versioned binary frame: `[version_byte][bincode body]`.
pub fn encode_binary(packet: &Packet) -> Result<Vec<u8>, CodecError> {
    let wire = WirePacket {
        data: packet.data.clone().map(payload_to_wire).transpose()?,
        source: packet.source,
        channel: packet.channel.clone(),
        rpc: packet.rpc.clone().map(rpc_to_wire).transpose()?,
    };
    let body = bincode::serialize(&wire)
        .map_err(|e| CodecError::Malformed(format!("failed to serialize packet: {e}")))?;
    if body.len() + 1 > MAX_PACKET_SIZE {
        return Err(CodecError::PayloadTooLarge {
            size: body.len() + 1,
            max: MAX_PACKET_SIZE,
        });
    }
    let mut frame = Vec::with_capacity(body.len() + 1);
    frame.push(BINARY_FORMAT_VERSION);
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode a packet from a versioned binary frame.
pub fn decode_binary(frame: &[u8]) -> Result<Packet, CodecError> {
    if frame.len() > MAX_PACKET_SIZE {
        return Err(CodecError::PayloadTooLarge {
            size: frame.len(),
            max: MAX_PACKET_SIZE,
        });
    }
    let (&version, body) = frame.split_first().ok_or(CodecError::Truncated {
        expected: 1,
        got: 0,
    })?;
    if version != BINARY_FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion {
            found: version,
            expected: BINARY_FORMAT_VERSION,
        });
    }
    let wire: WirePacket = bincode::deserialize(body).map_err(|e| CodecError::Malformed(e.to_string()))?;
    Ok(Packet {
        data: wire.data.map(wire_to_payload).transpose()?,
        source: wire.source,
        channel: wire.channel,
        rpc: wire.rpc.map(wire_to_rpc).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_types::{RpcEnvelope, Source};

    #[test]
    fn plain_packet_round_trips() {
        let packet = Packet::plain(Source::Server, "hello".to_string());
        let frame = encode_binary(&packet).unwrap();
        assert_eq!(frame[0], BINARY_FORMAT_VERSION);
        assert_eq!(decode_binary(&frame).unwrap(), packet);
    }

    #[test]
    fn byte_payload_carried_natively() {
        let packet = Packet::plain(Source::Client, vec![0u8, 1, 2, 255]);
        let frame = encode_binary(&packet).unwrap();
        assert_eq!(decode_binary(&frame).unwrap(), packet);
    }

    #[test]
    fn rpc_packet_round_trips() {
        let packet = Packet::for_rpc(RpcEnvelope::success(
            "abc",
            serde_json::Value::Bool(true),
        ));
        let frame = encode_binary(&packet).unwrap();
        assert_eq!(decode_binary(&frame).unwrap(), packet);
    }

    #[test]
    fn rpc_request_with_structured_args_round_trips() {
        let packet = Packet::for_rpc(RpcEnvelope::Request {
            call_id: "call-1".into(),
            method: "add".into(),
            args: vec![serde_json::json!(10), serde_json::json!({"nested": [1, 2, 3]})],
            kwargs: serde_json::json!({"flag": true}).as_object().unwrap().clone(),
        });
        let frame = encode_binary(&packet).unwrap();
        assert_eq!(decode_binary(&frame).unwrap(), packet);
    }

    #[test]
    fn channel_packet_with_json_object_round_trips() {
        let packet = Packet::for_channel("room1", serde_json::json!({"x": 1, "y": [true, null]}));
        let frame = encode_binary(&packet).unwrap();
        assert_eq!(decode_binary(&frame).unwrap(), packet);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut frame = encode_binary(&Packet::plain(Source::Server, "x".to_string())).unwrap();
        frame[0] = 99;
        assert!(matches!(
            decode_binary(&frame),
            Err(CodecError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn empty_frame_is_truncated() {
        assert!(matches!(
            decode_binary(&[]),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let huge = vec![BINARY_FORMAT_VERSION; MAX_PACKET_SIZE + 1];
        assert!(matches!(
            decode_binary(&huge),
            Err(CodecError::PayloadTooLarge { .. })
        ));
    }
}
