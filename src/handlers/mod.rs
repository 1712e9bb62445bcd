//! HTTP and WebSocket route handlers

pub mod websocket;

pub use websocket::{handle_ws_client, routes, ConnectHook};
