use std::collections::HashMap;

use crate::core::connection::Connection;
use crate::error::{DispatchError, Result};

/// Maps connection IDs to live connections.
/// A connection exists for the rest of the crate exactly while it is registered here.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<String, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Register a new connection
    pub fn register(&mut self, id: String, connection: Connection) -> Result<()> {
        if self.connections.contains_key(&id) {
            return Err(DispatchError::DuplicateConnection(id));
        }
        self.connections.insert(id, connection);
        Ok(())
    }

    // Resolve an ID to its connection
    pub fn lookup(&self, id: &str) -> Result<Connection> {
        self.connections
            .get(id)
            .cloned()
            .ok_or_else(|| DispatchError::ConnectionNotFound(id.to_string()))
    }

    // Remove a connection and hand it back
    pub fn unregister(&mut self, id: &str) -> Result<Connection> {
        self.connections
            .remove(id)
            .ok_or_else(|| DispatchError::ConnectionNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
