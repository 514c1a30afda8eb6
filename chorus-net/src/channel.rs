//! The channel registry (§4.5): named pub/sub groups over live connections.
//! Fan-out follows the same isolate-per-recipient-failure shape as the
//! reference flood broadcaster, generalized from "all peers" to "subscribers
//! of named channels" and from raw bytes to [`Packet`]s.

use std::collections::HashSet;
use std::sync::Arc;

use chorus_types::{Packet, Payload, Predicate};
use dashmap::DashSet;
use uuid::Uuid;

use crate::connection::Connection;
use crate::error::NetworkError;
use crate::registry::ConnectionRegistry;

/// Outcome of a `publish`/`broadcast` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    /// Number of recipients the packet was successfully enqueued for.
    pub sent: usize,
    /// Number of recipients skipped because their connection had already closed.
    pub failed: usize,
}

/// Named subscription groups backed by the shared connection registry.
pub struct ChannelRegistry {
    connections: Arc<ConnectionRegistry>,
    channels: DashSet<String>,
    members: dashmap::DashMap<String, DashSet<Uuid>>,
}

impl ChannelRegistry {
    pub fn new(connections: Arc<ConnectionRegistry>) -> Self {
        Self {
            connections,
            channels: DashSet::new(),
            members: dashmap::DashMap::new(),
        }
    }

    /// Idempotent: subscribing twice has the same effect as once.
    pub fn subscribe(&self, conn: &Connection, channel: impl Into<String>) {
        let channel = channel.into();
        self.members
            .entry(channel.clone())
            .or_default()
            .insert(conn.id());
        self.channels.insert(channel.clone());
        conn.subscribe(channel);
    }

    /// Idempotent: no error on an unknown channel.
    pub fn unsubscribe(&self, conn: &Connection, channel: &str) {
        conn.unsubscribe(channel);
        if let Some(members) = self.members.get(channel) {
            members.remove(&conn.id());
            let now_empty = members.is_empty();
            drop(members);
            if now_empty {
                self.members.remove(channel);
                self.channels.remove(channel);
            }
        }
    }

    /// Remove a disconnecting connection from every channel it was in.
    pub fn unsubscribe_all(&self, conn: &Connection) {
        for channel in conn.subscribed_channels() {
            self.unsubscribe(conn, &channel);
        }
    }

    pub fn is_member(&self, conn_id: Uuid, channel: &str) -> bool {
        self.members
            .get(channel)
            .map(|m| m.contains(&conn_id))
            .unwrap_or(false)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Publish `data` to the subscribers of each named channel. A connection
    /// subscribed to more than one of the given channels receives one packet
    /// per matching channel, each tagged with that channel's name.
    pub fn publish(
        &self,
        channels: impl IntoIterator<Item = impl Into<String>>,
        data: impl Into<Payload> + Clone,
        exclude: &HashSet<Uuid>,
        predicate: Option<&Predicate>,
    ) -> BroadcastResult {
        let mut result = BroadcastResult::default();
        for channel in channels {
            let channel = channel.into();
            let Some(members) = self.members.get(&channel) else {
                continue;
            };
            let recipients: Vec<Uuid> = members.iter().map(|id| *id).collect();
            drop(members);
            for id in recipients {
                if exclude.contains(&id) {
                    continue;
                }
                let Some(conn) = self.connections.get(id) else {
                    result.failed += 1;
                    continue;
                };
                if let Some(pred) = predicate {
                    if !pred.eval(conn.as_ref()) {
                        continue;
                    }
                }
                let packet = Packet::for_channel(channel.clone(), data.clone());
                self.enqueue(&conn, packet, &mut result);
            }
        }
        result
    }

    /// Publish `data` to every connected client, per the same exclude/predicate rules.
    pub fn broadcast(
        &self,
        data: impl Into<Payload> + Clone,
        exclude: &HashSet<Uuid>,
        predicate: Option<&Predicate>,
    ) -> BroadcastResult {
        let mut result = BroadcastResult::default();
        for conn in self.connections.all() {
            if exclude.contains(&conn.id()) {
                continue;
            }
            if let Some(pred) = predicate {
                if !pred.eval(conn.as_ref()) {
                    continue;
                }
            }
            let packet = Packet::for_broadcast(data.clone());
            self.enqueue(&conn, packet, &mut result);
        }
        result
    }

    /// Send `data` to exactly one connection by id, bypassing channel
    /// membership. Non-blocking: a full outbound buffer or an unknown id
    /// fails fast rather than stalling the caller.
    pub fn send_direct(&self, id: Uuid, data: impl Into<Payload>) -> Result<(), NetworkError> {
        let conn = self.connections.require(id)?;
        conn.try_send(data.into())
    }

    fn enqueue(&self, conn: &Arc<Connection>, packet: Packet, result: &mut BroadcastResult) {
        if conn.is_closed() {
            result.failed += 1;
            return;
        }
        // Connections never actually hit the Block branch here since this is
        // a sync call site; use try-send semantics via a detached task.
        let conn = conn.clone();
        tokio::spawn(async move {
            let _ = conn.send(packet).await;
        });
        result.sent += 1;
    }
}
