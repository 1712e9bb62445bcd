//! warp WebSocket adapter

use async_trait::async_trait;
use futures_util::sink::SinkExt;
use futures_util::stream::{SplitSink, SplitStream, StreamExt};
use log::trace;
use warp::ws::{Message, WebSocket};

use crate::error::{DispatchError, Result};
use crate::transport::{FrameSink, FrameSource};

pub struct WsSink(SplitSink<WebSocket, Message>);

pub struct WsSource(SplitStream<WebSocket>);

/// Split an upgraded socket into the halves the dispatcher accepts
pub fn split(ws: WebSocket) -> (WsSink, WsSource) {
    let (tx, rx) = ws.split();
    (WsSink(tx), WsSource(rx))
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_frame(&mut self, frame: String) -> Result<()> {
        self.0
            .send(Message::text(frame))
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.0
            .close()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))
    }
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        loop {
            let msg = match self.0.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(DispatchError::Transport(e.to_string()))),
            };

            if msg.is_close() {
                return None;
            }

            if msg.is_text() || msg.is_binary() {
                return Some(match std::str::from_utf8(msg.as_bytes()) {
                    Ok(text) => Ok(text.to_string()),
                    Err(_) => Err(DispatchError::Protocol(
                        "binary frame is not valid UTF-8".to_string(),
                    )),
                });
            }

            // ping/pong are answered by the websocket layer
            trace!("Skipping control frame");
        }
    }
}
