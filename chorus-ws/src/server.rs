//! The server runtime (§4.7): an axum WebSocket endpoint wrapping the
//! `INIT -> STARTING -> RUNNING -> STOPPING -> STOPPED` state machine from
//! the distilled spec, accept/serve loop select!-ed against a shutdown
//! broadcast in the same idiom as the reference node's per-subsystem loops.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use chorus_codec::{decode_binary, decode_json, encode_json};
use chorus_net::{ChannelRegistry, Connection, ConnectionRegistry, SendPolicy};
use chorus_rpc::Dispatcher;
use chorus_types::{Packet, RpcEnvelope};
use chorus_utils::StatsCounter;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::handler::ConnectionHandler;

/// Standard WebSocket close code for admission refusal (§6).
const TRY_AGAIN_LATER: u16 = 1013;
/// Standard WebSocket close code for a clean shutdown (§6).
const NORMAL_CLOSURE: u16 = 1000;

/// Counters exposed via [`Server::stats`].
const STAT_NAMES: &[&str] = &["connections_accepted", "admission_refused", "rpc_dispatched"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerState {
    Init,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// The WebSocket server. Construct with [`Server::new`], register RPC
/// methods on [`Server::dispatcher`], then call [`Server::start`] followed
/// by [`Server::serve_forever`].
pub struct Server<H: ConnectionHandler> {
    config: ServerConfig,
    handler: Arc<H>,
    dispatcher: Arc<Dispatcher>,
    connections: Arc<ConnectionRegistry>,
    channels: Arc<ChannelRegistry>,
    state: Mutex<ServerState>,
    /// Broadcast so `serve_forever` and a future `wait_for_signal` caller can
    /// both observe one `close()` without either owning the other's lifetime.
    shutdown_tx: broadcast::Sender<()>,
    listener: Mutex<Option<TcpListener>>,
    bound_addr: Mutex<Option<SocketAddr>>,
    stats: StatsCounter,
}

impl<H: ConnectionHandler> Server<H> {
    pub fn new(config: ServerConfig, handler: H) -> Arc<Self> {
        chorus_utils::init_tracing();
        let connections = Arc::new(ConnectionRegistry::new());
        let channels = Arc::new(ChannelRegistry::new(connections.clone()));
        let (shutdown_tx, _) = broadcast::channel(1);
        Arc::new(Self {
            config,
            handler: Arc::new(handler),
            dispatcher: Arc::new(Dispatcher::new()),
            connections,
            channels,
            state: Mutex::new(ServerState::Init),
            shutdown_tx,
            listener: Mutex::new(None),
            bound_addr: Mutex::new(None),
            stats: StatsCounter::new(STAT_NAMES),
        })
    }

    /// Connection/admission/dispatch counters — process-local bookkeeping an
    /// embedder can poll or export, not part of the wire protocol.
    pub fn stats(&self) -> &StatsCounter {
        &self.stats
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn channels(&self) -> &Arc<ChannelRegistry> {
        &self.channels
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock().unwrap()
    }

    /// Bind the listener and transition to `RUNNING`. Does not block.
    pub async fn start(&self) -> Result<(), ServerError> {
        *self.state.lock().unwrap() = ServerState::Starting;
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;
        info!(%addr, "server listening");
        *self.bound_addr.lock().unwrap() = Some(listener.local_addr()?);
        *self.listener.lock().unwrap() = Some(listener);
        *self.state.lock().unwrap() = ServerState::Running;
        Ok(())
    }

    /// The address actually bound by [`Server::start`] — useful when `port`
    /// was `0` and the OS picked an ephemeral one.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound_addr.lock().unwrap()
    }

    fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/", get(ws_upgrade_handler))
            .with_state(self.clone())
    }

    /// Blocks until [`Server::close`] is called (or the listener errors out).
    pub async fn serve_forever(self: &Arc<Self>) -> Result<(), ServerError> {
        let listener = self
            .listener
            .lock()
            .unwrap()
            .take()
            .expect("start() must be called before serve_forever()");
        let app = self.router();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::select! {
            result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
                result?;
            }
            _ = shutdown_rx.recv() => {
                debug!("serve_forever interrupted by shutdown signal");
            }
        }
        Ok(())
    }

    /// Idempotent. Transitions to `STOPPING`, refuses new accepts, closes
    /// every live connection, waits for them to drain, then `STOPPED`.
    pub async fn close(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                ServerState::Stopping | ServerState::Stopped => return,
                _ => *state = ServerState::Stopping,
            }
        }
        let _ = self.shutdown_tx.send(());
        for conn in self.connections.all() {
            conn.close();
        }
        for _ in 0..100 {
            if self.connections.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        *self.state.lock().unwrap() = ServerState::Stopped;
    }

    /// Blocks until SIGINT or (on Unix) SIGTERM, then calls [`Server::close`].
    /// Host binaries that want `Ctrl-C` to drain connections can `tokio::spawn`
    /// this alongside [`Server::serve_forever`]; library callers driving their
    /// own control plane can call `close()` directly instead.
    pub async fn wait_for_signal(self: &Arc<Self>) {
        let ctrl_c = signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = terminate => info!("received SIGTERM, shutting down"),
        }

        self.close().await;
    }
}

async fn ws_upgrade_handler<H: ConnectionHandler>(
    State(server): State<Arc<Server<H>>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(server, socket, addr))
}

async fn handle_socket<H: ConnectionHandler>(server: Arc<Server<H>>, mut socket: WebSocket, addr: SocketAddr) {
    if let Some(max) = server.config.max_connection {
        if server.connections.len() >= max {
            server.stats.increment("admission_refused");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: TRY_AGAIN_LATER,
                    reason: "try again later".into(),
                })))
                .await;
            return;
        }
    }

    let conn = Arc::new(Connection::with_remote_address(
        Uuid::new_v4(),
        addr.to_string(),
        server.config.packet_qsize,
        server.config.packet_qsize,
        SendPolicy::Block,
    ));
    server.connections.insert(conn.clone());

    if let Err(reason) = server.handler.on_connect(conn.clone()).await {
        warn!(%reason, remote = %conn.remote_address(), "on_connect rejected connection");
        server.stats.increment("admission_refused");
        server.connections.remove(conn.id());
        let _ = socket.close().await;
        return;
    }
    conn.mark_open();
    server.stats.increment("connections_accepted");

    let (mut sink, mut stream) = socket.split();

    let write_conn = conn.clone();
    let write_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                packet = write_conn.next_outbound() => {
                    match encode_json(&packet) {
                        Ok(text) => {
                            if sink.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "failed to encode outbound packet"),
                    }
                }
                _ = write_conn.closed() => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: NORMAL_CLOSURE,
                            reason: "closing".into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match decode_json(&text) {
                            Ok(packet) => route_inbound(&server, &conn, packet).await,
                            Err(e) => {
                                warn!(error = %e, "dropping malformed text frame");
                                continue;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        match decode_binary(&bytes) {
                            Ok(packet) => route_inbound(&server, &conn, packet).await,
                            Err(e) => {
                                warn!(error = %e, "dropping malformed binary frame");
                                continue;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "read error, closing connection");
                        break;
                    }
                }
            }
            _ = conn.closed() => break,
        }
    }

    write_task.abort();
    conn.close();
    server.handler.on_disconnect(conn.clone()).await;
    server.channels.unsubscribe_all(&conn);
    server.dispatcher.forget_connection(&conn);
    server.connections.remove(conn.id());
    conn.finish_close();
}

async fn route_inbound<H: ConnectionHandler>(server: &Arc<Server<H>>, conn: &Arc<Connection>, packet: Packet) {
    if let Some(RpcEnvelope::Request { .. }) = &packet.rpc {
        let envelope = packet.rpc.unwrap();
        let dispatcher = server.dispatcher.clone();
        let conn = conn.clone();
        server.stats.increment("rpc_dispatched");
        tokio::spawn(async move { dispatcher.dispatch(conn, envelope).await });
        return;
    }

    conn.push_inbound(packet.clone()).await;
    // Awaited inline, not spawned: §5 guarantees on_receive sees packets in
    // wire order for a given connection, which a per-packet spawn would not.
    server.handler.on_receive(conn.clone(), packet).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::NoopHandler;

    #[test]
    fn new_server_starts_in_init_state() {
        let server = Server::new(ServerConfig::default(), NoopHandler);
        assert_eq!(server.state(), ServerState::Init);
    }

    #[test]
    fn new_server_starts_with_zeroed_stats() {
        let server = Server::new(ServerConfig::default(), NoopHandler);
        assert_eq!(server.stats().get("connections_accepted"), 0);
        assert_eq!(server.stats().get("admission_refused"), 0);
        assert_eq!(server.stats().get("rpc_dispatched"), 0);
    }

    #[tokio::test]
    async fn start_binds_and_transitions_to_running() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        };
        let server = Server::new(config, NoopHandler);
        server.start().await.unwrap();
        assert_eq!(server.state(), ServerState::Running);
    }

    #[tokio::test]
    async fn close_before_start_is_a_harmless_no_op() {
        let server = Server::new(ServerConfig::default(), NoopHandler);
        server.close().await;
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let server = Server::new(ServerConfig::default(), NoopHandler);
        server.close().await;
        server.close().await;
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn serve_forever_returns_once_closed_from_another_task() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        };
        let server = Server::new(config, NoopHandler);
        server.start().await.unwrap();

        let closer = server.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.close().await;
        });

        server.serve_forever().await.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
    }
}
