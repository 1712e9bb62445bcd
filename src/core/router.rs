//! Inbound frame routing
//! Classifies each frame as a system operation or a user event and applies it

use log::{debug, trace};

use crate::core::connection::Connection;
use crate::core::dispatcher::Dispatcher;
use crate::core::message::{self, InboundMessage, SystemEvent};
use crate::error::{DispatchError, Result};

/// Routes frames read from one connection
pub struct EventRouter {
    dispatcher: Dispatcher,
    max_frame_size: usize,
}

impl EventRouter {
    pub fn new(dispatcher: Dispatcher) -> Self {
        let max_frame_size = dispatcher.config().max_frame_size;
        Self {
            dispatcher,
            max_frame_size,
        }
    }

    /// Decode and apply one frame.
    ///
    /// Errors describe a dropped frame or a failed lookup; none of them are
    /// fatal for the connection the frame came from.
    pub async fn route(&self, connection: &Connection, frame: &str) -> Result<()> {
        if frame.len() > self.max_frame_size {
            return Err(DispatchError::MessageTooLarge(frame.len()));
        }

        match message::decode(frame)? {
            InboundMessage::System(event) => self.route_system(connection, event).await,
            InboundMessage::User { event, payload } => {
                match self.dispatcher.handler(connection.id(), &event)? {
                    Some(handler) => handler(connection.clone(), payload).await,
                    None => trace!("No handler for '{}' on {}", event, connection.id()),
                }
                Ok(())
            }
        }
    }

    async fn route_system(&self, connection: &Connection, event: SystemEvent) -> Result<()> {
        match event {
            SystemEvent::Join(room) => {
                debug!("{} joins '{}'", connection.id(), room);
                self.dispatcher.join(connection.id(), &room).await?;
            }
            SystemEvent::Leave(room) => {
                debug!("{} leaves '{}'", connection.id(), room);
                self.dispatcher.leave(connection.id(), &room).await;
            }
            SystemEvent::EmitTo(request) => {
                debug!(
                    "{} emits '{}' to {}",
                    connection.id(),
                    request.event,
                    request.recipient
                );
                self.dispatcher
                    .emit_to(&request.recipient, &request.event, &request.payload)
                    .await?;
            }
            SystemEvent::Broadcast(request) => {
                let report = self
                    .dispatcher
                    .broadcast(&request.room, &request.payload)
                    .await?;
                debug!(
                    "{} broadcast to {} members of '{}'",
                    connection.id(),
                    report.delivered.len(),
                    request.room
                );
            }
            SystemEvent::Unknown(name) => {
                debug!("Ignoring unknown system event '{}' from {}", name, connection.id());
            }
        }
        Ok(())
    }
}
