//! Server and client WebSocket runtimes (C7/C8): the accept/serve state
//! machine and the connect/retry/pending-call counterpart that exercises it.

mod client;
mod config;
mod error;
mod handler;
mod server;

pub use client::{Client, RpcResult};
pub use config::{ClientConfig, ServerConfig};
pub use error::{ClientError, ServerError};
pub use handler::{BoxFuture, ConnectionHandler, NoopHandler};
pub use server::{Server, ServerState};
