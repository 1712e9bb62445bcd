use std::convert::Infallible;
use std::sync::Arc;

use log::{error, info};
use warp::ws::{WebSocket, Ws};
use warp::Filter;

use crate::constants::{CLIENT_JS_PATH, WS_PATH};
use crate::core::{Connection, Dispatcher};
use crate::transport;

/// Reference browser client speaking the envelope protocol
pub const CLIENT_JS: &str = include_str!("../../assets/dispatcher.js");

/// Called for every accepted connection before its first frame is read
pub type ConnectHook = Arc<dyn Fn(&Connection) + Send + Sync>;

// Handle an upgraded WebSocket connection
pub async fn handle_ws_client(ws: WebSocket, dispatcher: Dispatcher, on_connect: ConnectHook) {
    let (sink, source) = transport::ws::split(ws);

    match dispatcher
        .accept_with(sink, source, |connection| on_connect(connection))
        .await
    {
        Ok(connection) => {
            info!("Client connected: {}", connection.id());
            info!("Current connections: {}", dispatcher.connection_count().await);
        }
        Err(e) => error!("Failed to accept websocket connection: {}", e),
    }
}

/// All routes: `/ws`, `/dispatcher.js` and `/health`
pub fn routes(
    dispatcher: Dispatcher,
    max_message_size: usize,
    on_connect: ConnectHook,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    ws_route(dispatcher, max_message_size, on_connect)
        .or(client_js_route())
        .or(health_route())
}

pub fn ws_route(
    dispatcher: Dispatcher,
    max_message_size: usize,
    on_connect: ConnectHook,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path(WS_PATH)
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_dispatcher(dispatcher))
        .and(with_hook(on_connect))
        .map(move |ws: Ws, dispatcher: Dispatcher, on_connect: ConnectHook| {
            ws.max_message_size(max_message_size)
                .on_upgrade(move |socket| handle_ws_client(socket, dispatcher, on_connect))
        })
}

pub fn client_js_route() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path(CLIENT_JS_PATH)
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::with_header(CLIENT_JS, "content-type", "application/javascript"))
}

pub fn health_route() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("health").and(warp::path::end()).map(|| "OK")
}

// Helpers to include shared state in requests
fn with_dispatcher(
    dispatcher: Dispatcher,
) -> impl Filter<Extract = (Dispatcher,), Error = Infallible> + Clone {
    warp::any().map(move || dispatcher.clone())
}

fn with_hook(on_connect: ConnectHook) -> impl Filter<Extract = (ConnectHook,), Error = Infallible> + Clone {
    warp::any().map(move || on_connect.clone())
}
