//! Transport boundary
//!
//! The dispatcher only needs three things from a transport: a blocking read of
//! the next frame, a write of one frame, and a way to close. The write and read
//! halves are split so the inbound task can own the read half while every
//! writer goes through the connection's write guard.

pub mod memory;
pub mod ws;

use async_trait::async_trait;

use crate::error::Result;

/// Write half of a transport
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Write one complete frame
    async fn send_frame(&mut self, frame: String) -> Result<()>;

    /// Release the transport. Further writes must fail.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a transport
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Wait for the next frame.
    ///
    /// `None` means the remote side closed the transport. `Some(Err(_))` with a
    /// `Protocol` error means one unusable frame was skipped; any other error is
    /// terminal for the connection.
    async fn next_frame(&mut self) -> Option<Result<String>>;
}
