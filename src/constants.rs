// Serving defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const WS_PATH: &str = "ws";
pub const CLIENT_JS_PATH: &str = "dispatcher.js";

// Frame limits
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

// System event names
pub const EVENT_JOIN: &str = "join";
pub const EVENT_LEAVE: &str = "leave";
pub const EVENT_EMIT_TO: &str = "emitTo";
pub const EVENT_BROADCAST: &str = "broadcast";
