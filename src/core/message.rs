//! Wire envelope and system event payloads
//!
//! Every frame is a JSON object `{"e": event, "s": system, "m": payload}`.
//! System frames are decoded into a closed set of control operations; unknown
//! system event names decode to `SystemEvent::Unknown` and are ignored by the
//! router.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{EVENT_BROADCAST, EVENT_EMIT_TO, EVENT_JOIN, EVENT_LEAVE};
use crate::error::{DispatchError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "e")]
    pub event: String,
    #[serde(rename = "s", default)]
    pub system: bool,
    #[serde(rename = "m", default)]
    pub payload: Value,
}

/// Payload of the `emitTo` system event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitToPayload {
    #[serde(rename = "r")]
    pub recipient: String,
    #[serde(rename = "e")]
    pub event: String,
    #[serde(rename = "m", default)]
    pub payload: Value,
}

/// Payload of the `broadcast` system event, in both directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastPayload {
    #[serde(rename = "r")]
    pub room: String,
    #[serde(rename = "m", default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SystemEvent {
    Join(String),
    Leave(String),
    EmitTo(EmitToPayload),
    Broadcast(BroadcastPayload),
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    System(SystemEvent),
    User { event: String, payload: Value },
}

impl Envelope {
    pub fn new(event: impl Into<String>, system: bool, payload: Value) -> Self {
        Self {
            event: event.into(),
            system,
            payload,
        }
    }

    /// Classify a decoded envelope
    pub fn into_inbound(self) -> Result<InboundMessage> {
        if !self.system {
            return Ok(InboundMessage::User {
                event: self.event,
                payload: self.payload,
            });
        }

        let event = match self.event.as_str() {
            EVENT_JOIN => SystemEvent::Join(room_name(self.payload, EVENT_JOIN)?),
            EVENT_LEAVE => SystemEvent::Leave(room_name(self.payload, EVENT_LEAVE)?),
            EVENT_EMIT_TO => SystemEvent::EmitTo(
                serde_json::from_value(self.payload)
                    .map_err(|e| DispatchError::Protocol(format!("invalid emitTo payload: {}", e)))?,
            ),
            EVENT_BROADCAST => SystemEvent::Broadcast(
                serde_json::from_value(self.payload).map_err(|e| {
                    DispatchError::Protocol(format!("invalid broadcast payload: {}", e))
                })?,
            ),
            _ => SystemEvent::Unknown(self.event),
        };

        Ok(InboundMessage::System(event))
    }
}

fn room_name(payload: Value, event: &str) -> Result<String> {
    match payload {
        Value::String(room) => Ok(room),
        other => Err(DispatchError::Protocol(format!(
            "{} payload must be a room name, got {}",
            event, other
        ))),
    }
}

/// Decode one raw frame
pub fn decode(frame: &str) -> Result<InboundMessage> {
    let envelope: Envelope = serde_json::from_str(frame)
        .map_err(|e| DispatchError::Protocol(format!("malformed envelope: {}", e)))?;
    envelope.into_inbound()
}

/// Encode an envelope for the wire
pub fn encode(event: &str, system: bool, payload: Value) -> Result<String> {
    Ok(serde_json::to_string(&Envelope::new(event, system, payload))?)
}

/// Encode a user event
pub fn encode_user(event: &str, payload: Value) -> Result<String> {
    encode(event, false, payload)
}

/// Encode a room broadcast, wrapping the payload with the originating room
pub fn encode_broadcast(room: &str, payload: Value) -> Result<String> {
    let wrapped = serde_json::to_value(BroadcastPayload {
        room: room.to_string(),
        payload,
    })?;
    encode(EVENT_BROADCAST, true, wrapped)
}
