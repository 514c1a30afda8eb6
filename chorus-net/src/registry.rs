//! The live-connection set (§4.7): every currently-connected peer, keyed by
//! connection id. Shared by the server runtime (admission bookkeeping) and
//! the channel registry (broadcast's "full set of connected clients").

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::connection::Connection;
use crate::error::NetworkError;

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub fn insert(&self, conn: Arc<Connection>) {
        self.connections.insert(conn.id(), conn);
    }

    pub fn remove(&self, id: Uuid) -> Option<Arc<Connection>> {
        self.connections.remove(&id).map(|(_, c)| c)
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|e| e.clone())
    }

    /// Like [`ConnectionRegistry::get`], but for call sites that want to
    /// `?`-propagate an unknown id instead of matching on `Option`.
    pub fn require(&self, id: Uuid) -> Result<Arc<Connection>, NetworkError> {
        self.get(id).ok_or_else(|| NetworkError::ConnectionNotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|e| e.value().clone()).collect()
    }
}
