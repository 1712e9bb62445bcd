//! Connection handle
//!
//! Owns the write half of one transport and serialises every write to it

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, Mutex};

use crate::core::dispatcher::WeakDispatcher;
use crate::core::handlers::{handler_fn, SharedHandlerTable};
use crate::core::message;
use crate::error::{DispatchError, Result};
use crate::transport::FrameSink;

const STATE_OPEN: u8 = 0;
const STATE_CLOSING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Lifecycle of a connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

type CloseHandler = Box<dyn FnOnce(&Connection) + Send>;

/// Cheaply cloneable handle to one accepted connection
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    id: String,
    sink: Mutex<Box<dyn FrameSink>>,
    handlers: SharedHandlerTable,
    state: AtomicU8,
    shutdown: watch::Sender<bool>,
    close_handler: StdMutex<Option<CloseHandler>>,
    dispatcher: WeakDispatcher,
    connected_at: Instant,
}

impl Connection {
    pub(crate) fn new(
        id: String,
        sink: Box<dyn FrameSink>,
        handlers: SharedHandlerTable,
        dispatcher: WeakDispatcher,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(ConnectionInner {
                id,
                sink: Mutex::new(sink),
                handlers,
                state: AtomicU8::new(STATE_OPEN),
                shutdown,
                close_handler: StdMutex::new(None),
                dispatcher,
                connected_at: Instant::now(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn state(&self) -> ConnectionState {
        match self.inner.state.load(Ordering::Acquire) {
            STATE_OPEN => ConnectionState::Open,
            STATE_CLOSING => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// How long the connection has been alive
    pub fn connection_duration(&self) -> Duration {
        self.inner.connected_at.elapsed()
    }

    /// Register the handler for a user event, replacing any previous one
    pub fn on<F, Fut>(&self, event: impl Into<String>, handler: F) -> Result<()>
    where
        F: Fn(Connection, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let event = event.into();
        let replaced = self
            .inner
            .handlers
            .write()?
            .set(&self.inner.id, event.clone(), handler_fn(handler))?;

        if replaced.is_some() {
            debug!("Replaced handler for '{}' on {}", event, self.inner.id);
        }
        Ok(())
    }

    /// Remove the handler for a user event. Returns false if none was registered.
    pub fn off(&self, event: &str) -> Result<bool> {
        Ok(self
            .inner
            .handlers
            .write()?
            .remove(&self.inner.id, event)
            .is_some())
    }

    /// Set the callback fired once when the connection closes
    pub fn on_close<F>(&self, callback: F)
    where
        F: FnOnce(&Connection) + Send + 'static,
    {
        let mut slot = self
            .inner
            .close_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Box::new(callback));
    }

    /// Send a user event to this connection
    pub async fn emit<T: Serialize + ?Sized>(&self, event: &str, payload: &T) -> Result<()> {
        let frame = message::encode_user(event, serde_json::to_value(payload)?)?;
        self.write(frame).await
    }

    /// Send an already encoded system envelope
    pub(crate) async fn system_emit(&self, frame: String) -> Result<()> {
        self.write(frame).await
    }

    async fn write(&self, frame: String) -> Result<()> {
        if !self.is_open() {
            return Err(DispatchError::ConnectionClosed);
        }

        let result = {
            let mut sink = self.inner.sink.lock().await;
            sink.send_frame(frame).await
        };

        // A failed write is fatal for this connection only
        if let Err(e) = &result {
            warn!("Write to {} failed: {}", self.inner.id, e);
            self.close().await;
        }
        result
    }

    /// Close the connection.
    ///
    /// A connection owned by a dispatcher is torn down through it, so by the
    /// time this returns it is unregistered, out of every room and its close
    /// callback has fired. Calling this more than once is a no-op.
    pub async fn close(&self) {
        match self.inner.dispatcher.upgrade() {
            Some(dispatcher) => {
                dispatcher.close(&self.inner.id).await;
            }
            None => self.terminate().await,
        }
    }

    /// Release the transport, move to `Closed` and fire the close callback.
    /// Only the first call has any effect.
    pub(crate) async fn terminate(&self) {
        if self
            .inner
            .state
            .compare_exchange(STATE_OPEN, STATE_CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        // wakes the inbound task out of its pending read
        self.inner.shutdown.send_replace(true);

        {
            let mut sink = self.inner.sink.lock().await;
            if let Err(e) = sink.close().await {
                debug!("Error closing transport for {}: {}", self.inner.id, e);
            }
        }

        self.inner.state.store(STATE_CLOSED, Ordering::Release);

        let callback = self
            .inner
            .close_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(callback) = callback {
            callback(self);
        }
    }

    /// Resolves once `close` has been called
    pub(crate) async fn closed(&self) {
        let mut rx = self.inner.shutdown.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}
