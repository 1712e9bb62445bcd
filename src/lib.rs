//! Socket Dispatch - room-based event dispatching over persistent connections
//!
//! Clients open one connection, register event handlers, emit events,
//! join and leave named rooms and receive room broadcasts.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod transport;

// Re-export main components
pub use config::*;
pub use constants::*;
pub use crate::core::{BroadcastReport, Connection, ConnectionState, Dispatcher};
pub use error::{DispatchError, Result};
