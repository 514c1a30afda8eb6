//! The client runtime (§4.8): the mirror image of the server — connect with
//! retry, a send loop and a read loop, and a pending-call table correlating
//! RPC responses back to their awaiting callers by `call_id`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::warn;
use uuid::Uuid;

use chorus_codec::{decode_json, encode_json};
use chorus_types::{ErrorCode, Packet, RpcEnvelope};

use crate::config::ClientConfig;
use crate::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An RPC response, returned to `send_rpc` callers for inspection even when
/// it carries an error code other than the one the caller opted to raise on.
pub type RpcResult = Result<(Value, Option<ErrorCode>), ClientError>;

/// A connected client. Cheap to clone — internally reference-counted.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    outbound: mpsc::UnboundedSender<Packet>,
    pending: Arc<DashMap<String, oneshot::Sender<RpcEnvelope>>>,
    read_task: JoinHandle<()>,
    write_task: JoinHandle<()>,
}

impl Client {
    /// Attempt a single connection. If `retry` is set, failures are retried
    /// with exponential backoff (`retry_interval * 2^k`, capped at 60s) up
    /// to `max_retry_attempt` attempts.
    pub async fn connect(
        config: ClientConfig,
        retry: bool,
        max_retry_attempt: u32,
        retry_interval: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Packet>), ClientError> {
        let mut attempt = 0;
        let mut last_error = String::new();
        loop {
            attempt += 1;
            match connect_async(config.uri.as_str()).await {
                Ok((stream, _response)) => return Ok(Self::spawn(config, stream)),
                Err(e) => {
                    last_error = e.to_string();
                    if !retry || attempt >= max_retry_attempt {
                        return Err(ClientError::ConnectFailed {
                            uri: config.uri.clone(),
                            attempts: attempt,
                            last_error,
                        });
                    }
                    let backoff = retry_interval * 2u32.saturating_pow(attempt - 1);
                    let backoff = backoff.min(Duration::from_secs(60));
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    fn spawn(config: ClientConfig, stream: WsStream) -> (Self, mpsc::UnboundedReceiver<Packet>) {
        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Packet>();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel::<Packet>();

        let pending: Arc<DashMap<String, oneshot::Sender<RpcEnvelope>>> = Arc::new(DashMap::new());

        let write_task = tokio::spawn(async move {
            while let Some(packet) = outbound_rx.recv().await {
                match encode_json(&packet) {
                    Ok(text) => {
                        if sink.send(WsMessage::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to encode outbound packet"),
                }
            }
        });

        let pending_for_read = pending.clone();
        let incoming_for_read = incoming_tx;
        let read_task = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let packet = match frame {
                    Ok(WsMessage::Text(text)) => match decode_json(text.as_str()) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(error = %e, "dropping malformed inbound frame");
                            continue;
                        }
                    },
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };

                if let Some(RpcEnvelope::Response { call_id, .. }) = &packet.rpc {
                    if let Some((_, sink)) = pending_for_read.remove(call_id) {
                        let envelope = packet.rpc.unwrap();
                        let _ = sink.send(envelope);
                        continue;
                    }
                    warn!(%call_id, "dropping unmatched RPC response");
                    continue;
                }

                let _ = incoming_for_read.send(packet);
            }
        });

        let client = Self {
            inner: Arc::new(Inner {
                config,
                outbound: outbound_tx,
                pending,
                read_task,
                write_task,
            }),
        };
        (client, incoming_rx)
    }

    /// Send a packet that does not expect a correlated response.
    pub fn send(&self, packet: Packet) -> Result<(), ClientError> {
        self.inner
            .outbound
            .send(packet)
            .map_err(|_| ClientError::Disconnected)
    }

    /// Issue an RPC call and await its response up to `timeout`.
    ///
    /// Returns `Ok((value, error_code))` on any response — callers that want
    /// a `RATE_LIMITED` response turned into an `Err` should pass
    /// `raise_on_rate_limit = true`.
    pub async fn send_rpc(
        &self,
        method: impl Into<String>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        timeout: Duration,
        raise_on_rate_limit: bool,
    ) -> RpcResult {
        let call_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(call_id.clone(), tx);

        let envelope = RpcEnvelope::Request {
            call_id: call_id.clone(),
            method: method.into(),
            args,
            kwargs,
        };
        if self.inner.outbound.send(Packet::for_rpc(envelope)).is_err() {
            self.inner.pending.remove(&call_id);
            return Err(ClientError::Disconnected);
        }

        let response = tokio::time::timeout(timeout, rx).await;
        match response {
            Ok(Ok(RpcEnvelope::Response { response, error, .. })) => {
                if raise_on_rate_limit && error == Some(ErrorCode::RateLimited) {
                    return Err(ClientError::RateLimited);
                }
                Ok((response, error))
            }
            Ok(Ok(RpcEnvelope::Request { .. })) => {
                unreachable!("pending-call sinks are only ever fulfilled with a Response")
            }
            Ok(Err(_)) => Err(ClientError::Disconnected),
            Err(_) => {
                self.inner.pending.remove(&call_id);
                Err(ClientError::Timeout)
            }
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Tear down the read and write loops. Further `send`/`send_rpc` calls
    /// fail with [`ClientError::Disconnected`].
    pub fn disconnect(&self) {
        self.inner.read_task.abort();
        self.inner.write_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::handler::NoopHandler;
    use crate::server::Server;

    async fn start_test_server() -> (Arc<Server<NoopHandler>>, String) {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        };
        let server = Server::new(config, NoopHandler);
        server.start().await.unwrap();
        let addr = server.local_addr().unwrap();
        let running = server.clone();
        tokio::spawn(async move {
            let _ = running.serve_forever().await;
        });
        (server, format!("ws://{addr}/"))
    }

    #[tokio::test]
    async fn echo_rpc_round_trips_over_a_real_socket() {
        let (server, uri) = start_test_server().await;
        server
            .dispatcher()
            .register("add", None, None, |_conn, args, _kwargs| async move {
                let a = args[0].as_i64().unwrap_or(0);
                let b = args[1].as_i64().unwrap_or(0);
                Value::from(a + b)
            })
            .unwrap();

        let (client, _incoming) = Client::connect(ClientConfig::new(uri), false, 1, Duration::from_millis(10))
            .await
            .unwrap();

        let (value, error) = client
            .send_rpc(
                "add",
                vec![Value::from(10), Value::from(20)],
                Map::new(),
                Duration::from_secs(1),
                true,
            )
            .await
            .unwrap();
        assert_eq!(value, Value::from(30));
        assert!(error.is_none());

        server.close().await;
    }

    #[tokio::test]
    async fn connect_to_unreachable_port_fails_after_retries() {
        let config = ClientConfig::new("ws://127.0.0.1:1/");
        let result = Client::connect(config, true, 2, Duration::from_millis(1)).await;
        assert!(matches!(result, Err(ClientError::ConnectFailed { attempts: 2, .. })));
    }
}
