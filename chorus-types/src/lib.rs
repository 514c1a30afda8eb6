//! Fundamental types shared across the workspace.
//!
//! This crate defines the packet model (C1's payload), the RPC envelope, the
//! predicate algebra (C2), and the error code vocabulary. None of it depends
//! on `tokio` or on the connection/dispatcher crates — it's pure data plus
//! the predicate evaluator, kept free of I/O so it can be unit-tested in
//! isolation and shared by both the server and client runtimes.

pub mod error;
pub mod packet;
pub mod predicate;
pub mod rpc;

pub use error::TypesError;
pub use packet::{Packet, Payload, Source};
pub use predicate::{AttributeSource, Predicate};
pub use rpc::{ErrorCode, RpcEnvelope};
