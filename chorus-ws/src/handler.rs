//! The callback trait user code implements to hook into connection
//! lifecycle events (§6's `clientHandler`).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chorus_net::Connection;
use chorus_types::Packet;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default implementations are no-ops, matching §6: "Default implementations
/// manage framework bookkeeping and must be invoked (or replicated) by
/// overrides" — the framework's own bookkeeping (registry/channel cleanup)
/// happens in the server runtime regardless of what the override does.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Called once the connection is admitted, before it moves to `Open`.
    /// Returning `Err` aborts this connection only.
    fn on_connect(&self, conn: Arc<Connection>) -> BoxFuture<'static, Result<(), String>> {
        Box::pin(async move {
            let _ = conn;
            Ok(())
        })
    }

    /// Called for every inbound packet that is not itself an RPC request
    /// (RPC requests go to the dispatcher instead, per §4.7 step 4).
    fn on_receive(&self, conn: Arc<Connection>, packet: Packet) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let _ = (conn, packet);
        })
    }

    fn on_disconnect(&self, conn: Arc<Connection>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let _ = conn;
        })
    }
}

/// A handler with no behavior beyond the framework's own bookkeeping.
pub struct NoopHandler;

impl ConnectionHandler for NoopHandler {}
