//! Configuration module
//! Dispatcher limits for the library and serving parameters for the binary

use crate::constants::{DEFAULT_HOST, DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PORT};
use crate::error::{DispatchError, Result};
use std::env;
use std::str::FromStr;

/// Limits applied by the dispatcher core
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Inbound frames larger than this are dropped as protocol errors
    pub max_frame_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Serving parameters for the demo binary
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub dispatcher: DispatcherConfig,
    /// Largest WebSocket message accepted by the upgrade layer
    pub max_message_size: usize,
    pub enable_tls: bool,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

impl ServerConfig {
    /// Configuration for tests and local runs
    pub fn local() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            dispatcher: DispatcherConfig::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            enable_tls: false,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let host = env::var("DISPATCHER_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = parse_var("DISPATCHER_PORT", DEFAULT_PORT)?;
        let max_frame_size = parse_var("DISPATCHER_MAX_FRAME_SIZE", DEFAULT_MAX_FRAME_SIZE)?;
        let max_message_size = parse_var("DISPATCHER_MAX_MESSAGE_SIZE", DEFAULT_MAX_MESSAGE_SIZE)?;

        let enable_tls = env::var("DISPATCHER_ENABLE_TLS")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);
        let tls_cert_path = env::var("DISPATCHER_TLS_CERT_PATH").ok();
        let tls_key_path = env::var("DISPATCHER_TLS_KEY_PATH").ok();

        if enable_tls {
            match (&tls_cert_path, &tls_key_path) {
                (Some(cert_path), Some(key_path)) => {
                    if !std::path::Path::new(cert_path).exists() {
                        return Err(DispatchError::Config(format!(
                            "TLS certificate file does not exist: {}",
                            cert_path
                        )));
                    }
                    if !std::path::Path::new(key_path).exists() {
                        return Err(DispatchError::Config(format!(
                            "TLS private key file does not exist: {}",
                            key_path
                        )));
                    }
                }
                _ => {
                    return Err(DispatchError::Config(
                        "TLS is enabled but DISPATCHER_TLS_CERT_PATH or DISPATCHER_TLS_KEY_PATH is not set"
                            .to_string(),
                    ))
                }
            }
        }

        if max_frame_size == 0 {
            return Err(DispatchError::Config(
                "DISPATCHER_MAX_FRAME_SIZE must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            host,
            port,
            dispatcher: DispatcherConfig { max_frame_size },
            max_message_size,
            enable_tls,
            tls_cert_path,
            tls_key_path,
        })
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| DispatchError::Config(format!("{} has an invalid value: '{}'", name, raw))),
        Err(_) => Ok(default),
    }
}
