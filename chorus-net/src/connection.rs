//! The connection object (§4.4): one per accepted socket or outbound client
//! link. Owns the outbound buffer, the channel-subscription index, and the
//! dynamic session attribute bag predicates read through [`AttributeSource`].

use std::collections::VecDeque;
use std::sync::Mutex;

use chorus_types::{AttributeSource, Packet, Payload, Source};
use dashmap::{DashMap, DashSet};
use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::NetworkError;

/// Governs what happens when [`Connection::send`] is called against a full
/// outbound buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendPolicy {
    /// Await until space frees up (backpressures the caller).
    Block,
    /// Drop the oldest queued packet to make room for the new one.
    DropOldest,
}

impl Default for SendPolicy {
    fn default() -> Self {
        SendPolicy::Block
    }
}

/// Anything [`Connection::send`] accepts: a ready-made [`Packet`], or a raw
/// string/byte payload that gets wrapped in a default-source packet.
pub enum Sendable {
    Packet(Packet),
    Raw(Payload),
}

impl From<Packet> for Sendable {
    fn from(p: Packet) -> Self {
        Sendable::Packet(p)
    }
}

impl From<Payload> for Sendable {
    fn from(p: Payload) -> Self {
        Sendable::Raw(p)
    }
}

impl From<String> for Sendable {
    fn from(s: String) -> Self {
        Sendable::Raw(Payload::from(s))
    }
}

impl From<&str> for Sendable {
    fn from(s: &str) -> Self {
        Sendable::Raw(Payload::from(s.to_string()))
    }
}

impl From<Vec<u8>> for Sendable {
    fn from(b: Vec<u8>) -> Self {
        Sendable::Raw(Payload::from(b))
    }
}

impl From<Value> for Sendable {
    fn from(v: Value) -> Self {
        Sendable::Raw(Payload::from(v))
    }
}

/// Where a connection sits in its lifecycle (§3). Server-side, the accept
/// loop drives `Connecting -> Open` once `on_connect` returns and
/// `Closing -> Closed` once teardown (unsubscribe, drain) has run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// A bounded packet buffer with a configurable full-queue policy, used for
/// both the outbound send buffer and the pull-style inbound queue.
struct PacketQueue {
    capacity: usize,
    policy: SendPolicy,
    queue: Mutex<VecDeque<Packet>>,
    item_available: Notify,
    space_available: Notify,
}

impl PacketQueue {
    fn new(capacity: usize, policy: SendPolicy) -> Self {
        Self {
            capacity,
            policy,
            queue: Mutex::new(VecDeque::new()),
            item_available: Notify::new(),
            space_available: Notify::new(),
        }
    }

    async fn push(&self, packet: Packet) {
        loop {
            {
                let mut q = self.queue.lock().unwrap();
                if q.len() < self.capacity {
                    q.push_back(packet);
                    self.item_available.notify_one();
                    return;
                }
                if self.policy == SendPolicy::DropOldest {
                    q.pop_front();
                    q.push_back(packet);
                    self.item_available.notify_one();
                    return;
                }
            }
            self.space_available.notified().await;
        }
    }

    /// Non-blocking variant of [`PacketQueue::push`]: under `SendPolicy::Block`,
    /// returns the packet back to the caller instead of waiting for space.
    fn try_push(&self, packet: Packet) -> Result<(), Packet> {
        let mut q = self.queue.lock().unwrap();
        if q.len() < self.capacity {
            q.push_back(packet);
            self.item_available.notify_one();
            return Ok(());
        }
        if self.policy == SendPolicy::DropOldest {
            q.pop_front();
            q.push_back(packet);
            self.item_available.notify_one();
            return Ok(());
        }
        Err(packet)
    }

    async fn recv(&self) -> Packet {
        loop {
            {
                let mut q = self.queue.lock().unwrap();
                if let Some(packet) = q.pop_front() {
                    self.space_available.notify_one();
                    return packet;
                }
            }
            self.item_available.notified().await;
        }
    }

    fn clear(&self) {
        self.queue.lock().unwrap().clear();
        self.space_available.notify_waiters();
    }
}

/// One connected peer. Cheap to clone (an `Arc` internally via the registry),
/// safe to call from any task.
pub struct Connection {
    id: Uuid,
    remote_address: String,
    state: Mutex<ConnectionState>,
    outbound: PacketQueue,
    inbound: PacketQueue,
    subscribed: DashSet<String>,
    session: DashMap<String, Value>,
    close_notify: Notify,
}

/// Default size of the inbound pull-queue (§6's `packet_qsize`).
pub const DEFAULT_PACKET_QSIZE: usize = 128;

impl Connection {
    pub fn new(id: Uuid, outbound_capacity: usize, policy: SendPolicy) -> Self {
        Self::with_remote_address(id, String::new(), outbound_capacity, DEFAULT_PACKET_QSIZE, policy)
    }

    pub fn with_remote_address(
        id: Uuid,
        remote_address: String,
        outbound_capacity: usize,
        inbound_capacity: usize,
        policy: SendPolicy,
    ) -> Self {
        Self {
            id,
            remote_address,
            state: Mutex::new(ConnectionState::Connecting),
            outbound: PacketQueue::new(outbound_capacity, policy),
            inbound: PacketQueue::new(inbound_capacity, SendPolicy::DropOldest),
            subscribed: DashSet::new(),
            session: DashMap::new(),
            close_notify: Notify::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn remote_address(&self) -> &str {
        &self.remote_address
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    /// `true` once the connection has begun (or finished) closing — the
    /// point past which `send` stops admitting new packets.
    pub fn is_closed(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Closing | ConnectionState::Closed
        )
    }

    /// `Connecting -> Open`, once the user's `on_connect` callback has
    /// returned successfully. A no-op once past `Connecting`.
    pub fn mark_open(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == ConnectionState::Connecting {
            *state = ConnectionState::Open;
        }
    }

    /// Enqueue a packet for delivery. Errs if the connection has already closed.
    pub async fn send(&self, data: impl Into<Sendable>) -> Result<(), NetworkError> {
        if self.is_closed() {
            return Err(NetworkError::ConnectionClosed(self.id.to_string()));
        }
        let packet = match data.into() {
            Sendable::Packet(p) => p,
            Sendable::Raw(payload) => Packet::plain(Source::Server, payload),
        };
        self.outbound.push(packet).await;
        Ok(())
    }

    /// Non-blocking variant of [`Connection::send`] for callers that would
    /// rather fail fast than backpressure on a `SendPolicy::Block` queue —
    /// e.g. a unicast reply that shouldn't stall the caller behind a slow peer.
    pub fn try_send(&self, data: impl Into<Sendable>) -> Result<(), NetworkError> {
        if self.is_closed() {
            return Err(NetworkError::ConnectionClosed(self.id.to_string()));
        }
        let packet = match data.into() {
            Sendable::Packet(p) => p,
            Sendable::Raw(payload) => Packet::plain(Source::Server, payload),
        };
        self.outbound
            .try_push(packet)
            .map_err(|_| NetworkError::BufferFull(self.id.to_string()))
    }

    /// Pull the next outbound packet. Used by the connection's write loop.
    pub async fn next_outbound(&self) -> Packet {
        self.outbound.recv().await
    }

    /// Hand an inbound packet to pull-style consumers, alongside the
    /// framework's own push delivery to `on_receive` (§4.7 step 4).
    pub async fn push_inbound(&self, packet: Packet) {
        self.inbound.push(packet).await;
    }

    /// Pull the next inbound packet queued for this connection.
    pub async fn next_inbound(&self) -> Packet {
        self.inbound.recv().await
    }

    pub fn subscribe(&self, channel: impl Into<String>) {
        self.subscribed.insert(channel.into());
    }

    pub fn subscribe_many(&self, channels: impl IntoIterator<Item = String>) {
        for c in channels {
            self.subscribed.insert(c);
        }
    }

    pub fn unsubscribe(&self, channel: &str) {
        self.subscribed.remove(channel);
    }

    pub fn subscribed_channels(&self) -> Vec<String> {
        self.subscribed.iter().map(|c| c.clone()).collect()
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.subscribed.contains(channel)
    }

    pub fn get_attr(&self, key: &str) -> Option<Value> {
        self.session.get(key).map(|v| v.clone())
    }

    pub fn set_attr(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.session.insert(key.into(), value.into());
    }

    /// Initiates `CLOSING`. Idempotent — returns `true` the first time it
    /// actually transitions the connection, `false` on every later call.
    pub fn close(&self) -> bool {
        let transitioned = {
            let mut state = self.state.lock().unwrap();
            match *state {
                ConnectionState::Connecting | ConnectionState::Open => {
                    *state = ConnectionState::Closing;
                    true
                }
                ConnectionState::Closing | ConnectionState::Closed => false,
            }
        };
        if transitioned {
            self.outbound.clear();
            self.close_notify.notify_waiters();
        }
        transitioned
    }

    /// Resolves once `close()` has been called. Used by read/write loops to
    /// interrupt a pending `next_outbound`/`next_inbound` wait on shutdown.
    pub async fn closed(&self) {
        if self.is_closed() {
            return;
        }
        self.close_notify.notified().await;
    }

    /// `Closing -> Closed`, once the server has finished unsubscribing this
    /// connection from every channel and draining its buffers (§4.7 step 5).
    /// A no-op if called before `close()` or more than once.
    pub fn finish_close(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == ConnectionState::Closing {
            *state = ConnectionState::Closed;
        }
    }
}

impl AttributeSource for Connection {
    fn attr(&self, key: &str) -> Option<Value> {
        self.get_attr(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        Connection::new(Uuid::new_v4(), 4, SendPolicy::Block)
    }

    #[tokio::test]
    async fn send_then_receive_preserves_order() {
        let c = conn();
        c.send("first").await.unwrap();
        c.send("second").await.unwrap();
        let p1 = c.next_outbound().await;
        let p2 = c.next_outbound().await;
        assert_eq!(p1.data.unwrap().as_value().unwrap(), "first");
        assert_eq!(p2.data.unwrap().as_value().unwrap(), "second");
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let c = conn();
        assert!(c.close());
        assert!(c.send("x").await.is_err());
    }

    #[test]
    fn close_is_idempotent() {
        let c = conn();
        assert!(c.close());
        assert!(!c.close());
    }

    #[test]
    fn subscribe_unsubscribe_round_trips() {
        let c = conn();
        c.subscribe("room1");
        assert!(c.is_subscribed("room1"));
        c.unsubscribe("room1");
        assert!(!c.is_subscribed("room1"));
    }

    #[test]
    fn unsubscribe_unknown_channel_is_a_no_op() {
        let c = conn();
        c.unsubscribe("never-subscribed");
    }

    #[test]
    fn missing_attribute_reads_as_none() {
        let c = conn();
        assert_eq!(c.get_attr("is_admin"), None);
        c.set_attr("is_admin", true);
        assert_eq!(c.get_attr("is_admin"), Some(Value::Bool(true)));
    }

    #[tokio::test]
    async fn drop_oldest_policy_evicts_head_when_full() {
        let c = Connection::new(Uuid::new_v4(), 2, SendPolicy::DropOldest);
        c.send("a").await.unwrap();
        c.send("b").await.unwrap();
        c.send("c").await.unwrap();
        let p1 = c.next_outbound().await;
        let p2 = c.next_outbound().await;
        assert_eq!(p1.data.unwrap().as_value().unwrap(), "b");
        assert_eq!(p2.data.unwrap().as_value().unwrap(), "c");
    }

    #[test]
    fn starts_connecting_and_opens_once() {
        let c = conn();
        assert_eq!(c.state(), ConnectionState::Connecting);
        c.mark_open();
        assert_eq!(c.state(), ConnectionState::Open);
        c.mark_open();
        assert_eq!(c.state(), ConnectionState::Open);
    }

    #[test]
    fn close_then_finish_close_reaches_closed() {
        let c = conn();
        c.mark_open();
        assert!(c.close());
        assert_eq!(c.state(), ConnectionState::Closing);
        c.finish_close();
        assert_eq!(c.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn inbound_queue_is_pull_readable() {
        let c = conn();
        c.push_inbound(Packet::plain(Source::Client, "hi".to_string())).await;
        let packet = c.next_inbound().await;
        assert_eq!(packet.data.unwrap().as_value().unwrap(), "hi");
    }

    #[test]
    fn try_send_fails_fast_on_a_full_block_queue() {
        let c = Connection::new(Uuid::new_v4(), 1, SendPolicy::Block);
        c.try_send("a").unwrap();
        assert!(matches!(c.try_send("b"), Err(NetworkError::BufferFull(_))));
    }

    #[test]
    fn try_send_after_close_fails() {
        let c = conn();
        c.close();
        assert!(matches!(c.try_send("x"), Err(NetworkError::ConnectionClosed(_))));
    }

    #[tokio::test]
    async fn block_policy_waits_for_drain() {
        use std::sync::Arc;
        let c = Arc::new(Connection::new(Uuid::new_v4(), 1, SendPolicy::Block));
        c.send("a").await.unwrap();

        let c2 = c.clone();
        let handle = tokio::spawn(async move {
            c2.send("b").await.unwrap();
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        let first = c.next_outbound().await;
        assert_eq!(first.data.unwrap().as_value().unwrap(), "a");
        handle.await.unwrap();

        let second = c.next_outbound().await;
        assert_eq!(second.data.unwrap().as_value().unwrap(), "b");
    }
}
