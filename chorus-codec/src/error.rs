//! Errors raised while encoding or decoding a packet on the wire.

use thiserror::Error;

/// Largest packet this codec will decode, in bytes. Chosen well above any
/// realistic RPC argument list or channel payload while still bounding a
/// single malicious frame's memory cost.
pub const MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error("unsupported binary format version: {found} (expected {expected})")]
    UnsupportedVersion { found: u8, expected: u8 },

    #[error("packet of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("truncated frame: expected at least {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
}
