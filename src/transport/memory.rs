//! In-memory transport backed by unbounded channels
//!
//! Used to embed the dispatcher without a network and to drive it from tests.
//! The `MemoryPeer` plays the remote client: it pushes inbound frames and
//! receives everything the dispatcher writes.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{DispatchError, Result};
use crate::transport::{FrameSink, FrameSource};

pub struct MemorySink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<String>,
}

/// Remote end of an in-memory transport
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<String>>,
    outbound: mpsc::UnboundedReceiver<String>,
}

/// Create a connected sink/source pair together with the peer driving it
pub fn channel() -> (MemorySink, MemorySource, MemoryPeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    (
        MemorySink { tx: Some(outbound_tx) },
        MemorySource { rx: inbound_rx },
        MemoryPeer {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
        },
    )
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_frame(&mut self, frame: String) -> Result<()> {
        match &self.tx {
            Some(tx) => tx
                .send(frame)
                .map_err(|_| DispatchError::Transport("peer stopped reading".to_string())),
            None => Err(DispatchError::Transport("transport closed".to_string())),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        Ok(())
    }
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }
}

impl MemoryPeer {
    /// Push a frame towards the dispatcher. Returns false once disconnected.
    pub fn send(&self, frame: impl Into<String>) -> bool {
        match &self.inbound {
            Some(tx) => tx.send(frame.into()).is_ok(),
            None => false,
        }
    }

    /// Receive the next frame written by the dispatcher.
    /// Returns `None` once the dispatcher side released the transport.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Receive a frame if one is already queued
    pub fn try_recv(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }

    /// Close the peer's write direction, as a remote disconnect would
    pub fn disconnect(&mut self) {
        self.inbound = None;
    }

    /// Stop accepting frames so every later dispatcher write fails
    pub fn refuse_writes(&mut self) {
        self.outbound.close();
    }
}
