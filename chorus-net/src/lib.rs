//! Connection state, channel pub/sub, and per-method rate limiting.
//!
//! This crate owns everything that lives for the duration of a connected
//! socket but doesn't know how to read or write one — that's `chorus-ws`'s
//! job. `Connection` is the session bag and outbound buffer; `ChannelRegistry`
//! is the pub/sub fan-out; `RateLimiter` is the token-bucket gate the RPC
//! dispatcher consults before invoking a handler.

pub mod channel;
pub mod connection;
pub mod error;
pub mod registry;
pub mod throttle;

pub use channel::{BroadcastResult, ChannelRegistry};
pub use connection::{Connection, ConnectionState, Sendable, SendPolicy, DEFAULT_PACKET_QSIZE};
pub use error::NetworkError;
pub use registry::ConnectionRegistry;
pub use throttle::RateLimiter;
