use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use warp::Filter;

use socket_dispatch::config::ServerConfig;
use socket_dispatch::handlers::{routes, ConnectHook};
use socket_dispatch::{Connection, DispatchError, Dispatcher};

const INDEX_HTML: &str = include_str!("../../assets/index.html");
const TIME_ROOM: &str = "time";

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    name: String,
    email: String,
}

#[derive(Debug, Serialize)]
struct NewUser {
    id: u32,
    name: String,
    email: String,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Initialize env
    match dotenvy::dotenv() {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => debug!("No .env file loaded: {}", e),
    };

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration: host={}, port={}", config.host, config.port);

    let dispatcher = Dispatcher::new(config.dispatcher.clone());

    let on_connect: ConnectHook = Arc::new(|connection: &Connection| {
        if let Err(e) = connection.on("createUser", create_user) {
            warn!("Failed to register createUser on {}: {}", connection.id(), e);
        }
        connection.on_close(|connection| info!("Client disconnected: {}", connection.id()));
    });

    tokio::spawn(time_broadcaster(dispatcher.clone()));

    let index = warp::path::end().map(|| warp::reply::html(INDEX_HTML));
    let routes = index.or(routes(dispatcher, config.max_message_size, on_connect));

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    match (config.enable_tls, &config.tls_cert_path, &config.tls_key_path) {
        (true, Some(cert_path), Some(key_path)) => {
            info!("Starting dispatcher on https://{}", addr);
            warp::serve(routes)
                .tls()
                .cert_path(cert_path)
                .key_path(key_path)
                .run(addr)
                .await;
        }
        _ => {
            info!("Starting dispatcher on http://{}", addr);
            warp::serve(routes).run(addr).await;
        }
    }
}

// Reply to the sender with the created user
async fn create_user(connection: Connection, payload: Value) {
    let request: CreateUserRequest = match serde_json::from_value(payload) {
        Ok(request) => request,
        Err(e) => {
            warn!("Invalid createUser payload from {}: {}", connection.id(), e);
            return;
        }
    };

    let user = NewUser {
        id: 101,
        name: request.name,
        email: request.email,
    };

    if let Err(e) = connection.emit("newUser", &user).await {
        warn!("Failed to send newUser to {}: {}", connection.id(), e);
    }
}

// Broadcast the server time to the time room once per second
async fn time_broadcaster(dispatcher: Dispatcher) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        match dispatcher.broadcast(TIME_ROOM, &now).await {
            Ok(_) => {}
            Err(DispatchError::RoomNotFound(_)) => debug!("Nobody in '{}' yet", TIME_ROOM),
            Err(e) => warn!("Time broadcast failed: {}", e),
        }
    }
}
