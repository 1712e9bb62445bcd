//! Per-connection event handlers
//!
//! Each connection owns one map from event name to handler. Registering the
//! same event again replaces the previous handler; handlers are never chained.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::core::connection::Connection;
use crate::error::{DispatchError, Result};

/// Async callback invoked with the receiving connection and the event payload
pub type Handler = Arc<dyn Fn(Connection, Value) -> BoxFuture<'static, ()> + Send + Sync>;

pub type SharedHandlerTable = Arc<RwLock<HandlerTable>>;

pub fn shared_handler_table() -> SharedHandlerTable {
    Arc::new(RwLock::new(HandlerTable::new()))
}

/// Box an async closure into a `Handler`
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Connection, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |connection: Connection, payload: Value| -> BoxFuture<'static, ()> {
        Box::pin(f(connection, payload))
    })
}

#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<String, HashMap<String, Handler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an empty table for a newly accepted connection
    pub fn insert_connection(&mut self, connection_id: &str) {
        self.handlers.entry(connection_id.to_string()).or_default();
    }

    /// Drop every handler of a connection
    pub fn remove_connection(&mut self, connection_id: &str) -> bool {
        self.handlers.remove(connection_id).is_some()
    }

    /// Register a handler, returning the one it replaced
    pub fn set(
        &mut self,
        connection_id: &str,
        event: String,
        handler: Handler,
    ) -> Result<Option<Handler>> {
        let table = self
            .handlers
            .get_mut(connection_id)
            .ok_or(DispatchError::ConnectionClosed)?;
        Ok(table.insert(event, handler))
    }

    pub fn remove(&mut self, connection_id: &str, event: &str) -> Option<Handler> {
        self.handlers.get_mut(connection_id)?.remove(event)
    }

    pub fn get(&self, connection_id: &str, event: &str) -> Option<Handler> {
        self.handlers.get(connection_id)?.get(event).cloned()
    }

    pub fn handler_count(&self, connection_id: &str) -> usize {
        self.handlers.get(connection_id).map_or(0, HashMap::len)
    }

    pub fn connection_count(&self) -> usize {
        self.handlers.len()
    }
}
