//! Core functionality: connections, rooms, routing and the dispatcher facade

pub mod connection;
pub mod dispatcher;
pub mod handlers;
pub mod message;
pub mod registry;
pub mod room;
pub mod router;

// Re-export main components for convenience
pub use connection::{Connection, ConnectionState};
pub use dispatcher::{BroadcastReport, DeliveryFailure, Dispatcher};
pub use handlers::{Handler, HandlerTable};
pub use message::{BroadcastPayload, EmitToPayload, Envelope, InboundMessage, SystemEvent};
pub use registry::ConnectionRegistry;
pub use room::{RoomInfo, RoomManager};
pub use router::EventRouter;
