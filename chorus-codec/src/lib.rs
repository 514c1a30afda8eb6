//! Packet codec — JSON and binary wire encodings for [`chorus_types::Packet`] (§4.1).
//!
//! Two independent wire formats share the same domain type:
//! - [`json`] encodes to/from a human-readable JSON object, base64-wrapping
//!   raw byte payloads under the `__bytes__` key.
//! - [`binary`] encodes to/from a version-tagged, length-prefixed `bincode`
//!   frame, carrying byte payloads natively.
//!
//! Both directions obey the round-trip law: `decode(encode(p)) == p` for
//! every packet `p` the encoder accepts.

pub mod binary;
pub mod error;
pub mod json;

pub use error::{CodecError, MAX_PACKET_SIZE};
pub use json::{decode_json, encode_json};

pub use binary::{decode_binary, encode_binary, BINARY_FORMAT_VERSION};
