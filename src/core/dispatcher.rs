//! Dispatcher facade
//!
//! Owns the connection registry, the room manager and the handler tables, and
//! runs one inbound task per accepted connection.
//!
//! Lock order is registry, then rooms. The handler table lock is a std lock
//! and is never held across an await.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use futures_util::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::DispatcherConfig;
use crate::core::connection::Connection;
use crate::core::handlers::{shared_handler_table, Handler, SharedHandlerTable};
use crate::core::message;
use crate::core::registry::ConnectionRegistry;
use crate::core::room::{RoomInfo, RoomManager};
use crate::core::router::EventRouter;
use crate::error::{DispatchError, Result};
use crate::transport::{FrameSink, FrameSource};

/// A recipient a broadcast could not be delivered to
#[derive(Debug)]
pub struct DeliveryFailure {
    pub connection_id: String,
    pub error: DispatchError,
}

/// Per-recipient outcome of a broadcast
#[derive(Debug)]
pub struct BroadcastReport {
    pub room: String,
    pub delivered: Vec<String>,
    pub failed: Vec<DeliveryFailure>,
}

impl BroadcastReport {
    fn new(room: &str) -> Self {
        Self {
            room: room.to_string(),
            delivered: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn recipient_count(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    config: DispatcherConfig,
    registry: RwLock<ConnectionRegistry>,
    rooms: RwLock<RoomManager>,
    handlers: SharedHandlerTable,
}

/// Non-owning handle a connection keeps to the dispatcher that accepted it
#[derive(Clone)]
pub(crate) struct WeakDispatcher(Weak<DispatcherInner>);

impl WeakDispatcher {
    /// A handle that never upgrades, for connections with no dispatcher
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self(Weak::new())
    }

    pub(crate) fn upgrade(&self) -> Option<Dispatcher> {
        self.0.upgrade().map(|inner| Dispatcher { inner })
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                config,
                registry: RwLock::new(ConnectionRegistry::new()),
                rooms: RwLock::new(RoomManager::new()),
                handlers: shared_handler_table(),
            }),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Accept a transport and start its inbound task
    pub async fn accept<S, R>(&self, sink: S, source: R) -> Result<Connection>
    where
        S: FrameSink,
        R: FrameSource,
    {
        self.accept_with(sink, source, |_| {}).await
    }

    /// Accept a transport, running `setup` (typically handler registration)
    /// before the inbound task reads its first frame
    pub async fn accept_with<S, R, F>(&self, sink: S, source: R, setup: F) -> Result<Connection>
    where
        S: FrameSink,
        R: FrameSource,
        F: FnOnce(&Connection),
    {
        let id = Uuid::new_v4().to_string();
        let connection = Connection::new(
            id.clone(),
            Box::new(sink),
            self.inner.handlers.clone(),
            WeakDispatcher(Arc::downgrade(&self.inner)),
        );

        self.inner.handlers.write()?.insert_connection(&id);

        let registered = self
            .inner
            .registry
            .write()
            .await
            .register(id.clone(), connection.clone());
        if let Err(e) = registered {
            if let Ok(mut handlers) = self.inner.handlers.write() {
                handlers.remove_connection(&id);
            }
            return Err(e);
        }

        info!("Connection accepted: {}", id);
        setup(&connection);

        tokio::spawn(self.clone().read_loop(connection.clone(), source));

        Ok(connection)
    }

    // Reads frames in arrival order until the transport ends or the
    // connection is closed, then tears the connection down.
    async fn read_loop<R: FrameSource>(self, connection: Connection, mut source: R) {
        let router = EventRouter::new(self.clone());

        loop {
            let next = tokio::select! {
                frame = source.next_frame() => frame,
                _ = connection.closed() => {
                    debug!("Read loop for {} stopped by close", connection.id());
                    break;
                }
            };

            match next {
                Some(Ok(frame)) => {
                    if let Err(e) = router.route(&connection, &frame).await {
                        warn!("Frame from {} dropped: {}", connection.id(), e);
                    }
                }
                Some(Err(e @ DispatchError::Protocol(_))) => {
                    warn!("Frame from {} dropped: {}", connection.id(), e);
                }
                Some(Err(e)) => {
                    warn!("read: {}: {}", connection.id(), e);
                    break;
                }
                None => {
                    debug!("Remote side closed {}", connection.id());
                    break;
                }
            }
        }

        self.close(connection.id()).await;
    }

    /// Send a user event to one connection
    pub async fn emit_to<T: Serialize + ?Sized>(
        &self,
        recipient: &str,
        event: &str,
        payload: &T,
    ) -> Result<()> {
        let connection = self
            .inner
            .registry
            .read()
            .await
            .lookup(recipient)
            .map_err(|_| DispatchError::RecipientNotFound(recipient.to_string()))?;

        connection.emit(event, payload).await
    }

    /// Deliver a payload to every member of a room.
    ///
    /// Every member is attempted even when some writes fail. If any recipient
    /// failed the full report comes back inside `PartialDelivery`.
    pub async fn broadcast<T: Serialize + ?Sized>(
        &self,
        room: &str,
        payload: &T,
    ) -> Result<BroadcastReport> {
        let members = {
            let rooms = self.inner.rooms.read().await;
            if !rooms.contains_room(room) {
                return Err(DispatchError::RoomNotFound(room.to_string()));
            }
            rooms.members_of(room)
        };

        let frame = message::encode_broadcast(room, serde_json::to_value(payload)?)?;

        let recipients: Vec<(String, Option<Connection>)> = {
            let registry = self.inner.registry.read().await;
            members
                .into_iter()
                .map(|id| {
                    let connection = registry.lookup(&id).ok();
                    (id, connection)
                })
                .collect()
        };

        let sends = recipients.into_iter().map(|(id, connection)| {
            let frame = frame.clone();
            async move {
                let result = match connection {
                    Some(connection) => connection.system_emit(frame).await,
                    None => Err(DispatchError::ConnectionNotFound(id.clone())),
                };
                (id, result)
            }
        });

        let mut report = BroadcastReport::new(room);
        for (id, result) in join_all(sends).await {
            match result {
                Ok(()) => report.delivered.push(id),
                Err(e) => {
                    warn!("Broadcast to '{}' failed for {}: {}", room, id, e);
                    report.failed.push(DeliveryFailure {
                        connection_id: id,
                        error: e,
                    });
                }
            }
        }

        if report.is_complete() {
            Ok(report)
        } else {
            Err(DispatchError::PartialDelivery(report))
        }
    }

    /// Add a live connection to a room. Returns false if it was already a member.
    pub async fn join(&self, connection_id: &str, room: &str) -> Result<bool> {
        // Holding the registry read lock keeps a concurrent close from
        // unregistering the connection before its membership is recorded.
        let registry = self.inner.registry.read().await;
        if !registry.contains(connection_id) {
            return Err(DispatchError::ConnectionNotFound(connection_id.to_string()));
        }
        let joined = self.inner.rooms.write().await.join(connection_id, room);
        Ok(joined)
    }

    /// Remove a connection from a room. Returns false if it was not a member.
    pub async fn leave(&self, connection_id: &str, room: &str) -> bool {
        self.inner.rooms.write().await.leave(connection_id, room)
    }

    /// Tear a connection down: unregister it, drop its handlers, remove it from
    /// every room, release its transport and fire its close callback.
    ///
    /// Returns false if the connection was already gone.
    pub async fn close(&self, connection_id: &str) -> bool {
        let removed = self.inner.registry.write().await.unregister(connection_id);
        let connection = match removed {
            Ok(connection) => connection,
            Err(_) => {
                debug!("Close for unknown connection {}", connection_id);
                return false;
            }
        };

        match self.inner.handlers.write() {
            Ok(mut handlers) => {
                handlers.remove_connection(connection_id);
            }
            Err(e) => warn!("Failed to drop handlers for {}: {}", connection_id, e),
        }

        let left = self.inner.rooms.write().await.leave_all(connection_id);

        connection.terminate().await;

        info!(
            "Connection closed: {} after {:?} (left {} rooms)",
            connection_id,
            connection.connection_duration(),
            left.len()
        );
        true
    }

    pub(crate) fn handler(&self, connection_id: &str, event: &str) -> Result<Option<Handler>> {
        Ok(self.inner.handlers.read()?.get(connection_id, event))
    }

    pub async fn connection(&self, connection_id: &str) -> Result<Connection> {
        self.inner.registry.read().await.lookup(connection_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.registry.read().await.len()
    }

    pub async fn members_of(&self, room: &str) -> HashSet<String> {
        self.inner.rooms.read().await.members_of(room)
    }

    pub async fn rooms_of(&self, connection_id: &str) -> HashSet<String> {
        self.inner.rooms.read().await.rooms_of(connection_id)
    }

    pub async fn contains_room(&self, room: &str) -> bool {
        self.inner.rooms.read().await.contains_room(room)
    }

    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        self.inner.rooms.read().await.list_rooms()
    }

    /// Checks the room indexes against each other and against the registry
    pub async fn is_consistent(&self) -> bool {
        let registry = self.inner.registry.read().await;
        let rooms = self.inner.rooms.read().await;
        rooms.is_consistent()
            && rooms
                .list_rooms()
                .iter()
                .flat_map(|info| rooms.members_of(&info.name))
                .all(|id| registry.contains(&id))
    }
}
