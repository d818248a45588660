//! Server configuration types
//!
//! Defines the configuration structures for the SOCKS5 server.

use crate::error::SocksdError;
use crate::socks::MAX_CREDENTIAL_LEN;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    1080
}

fn default_handshake_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_shutdown_grace_period() -> u64 {
    10
}

fn default_half_close_timeout() -> u64 {
    5
}

fn default_relay_buffer_size() -> usize {
    16 * 1024
}

fn default_nodelay() -> bool {
    true
}

fn default_keepalive_secs() -> u64 {
    20
}

fn default_keepalive_interval() -> u64 {
    8
}

/// Smallest accepted relay buffer
pub const MIN_RELAY_BUFFER_SIZE: usize = 1024;

/// Largest accepted relay buffer
pub const MAX_RELAY_BUFFER_SIZE: usize = 64 * 1024;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// SOCKS5 server configuration
///
/// Immutable once the server is started. Credentials are either both
/// present (username/password auth) or both absent (no auth).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Host or IP to bind
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    /// Port to bind (0 picks an ephemeral port)
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Username for SOCKS5 auth
    #[serde(default)]
    pub username: Option<String>,

    /// Password for SOCKS5 auth
    #[serde(default)]
    pub password: Option<String>,

    /// Seconds allowed for greeting, auth and request
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: u64,

    /// Seconds allowed for resolving and dialing the destination
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Seconds in-flight sessions get after shutdown is requested
    #[serde(default = "default_shutdown_grace_period")]
    pub shutdown_grace_period: u64,

    /// Seconds the remaining relay direction may stay idle after the other ends
    #[serde(default = "default_half_close_timeout")]
    pub half_close_timeout: u64,

    /// Per-direction relay buffer in bytes
    #[serde(default = "default_relay_buffer_size")]
    pub relay_buffer_size: usize,

    /// Maximum concurrent sessions (0 = unlimited)
    #[serde(default)]
    pub max_connections: usize,

    /// Socket options for client and destination sockets
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            username: None,
            password: None,
            handshake_timeout: default_handshake_timeout(),
            connect_timeout: default_connect_timeout(),
            shutdown_grace_period: default_shutdown_grace_period(),
            half_close_timeout: default_half_close_timeout(),
            relay_buffer_size: default_relay_buffer_size(),
            max_connections: 0,
            tcp: TcpConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Check if authentication credentials are configured
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Address string handed to the listener
    pub fn listen_addr(&self) -> String {
        if self.listen_host.contains(':') && !self.listen_host.starts_with('[') {
            format!("[{}]:{}", self.listen_host, self.listen_port)
        } else {
            format!("{}:{}", self.listen_host, self.listen_port)
        }
    }

    /// Handshake phase deadline
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout)
    }

    /// Destination dial deadline
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Grace period for in-flight sessions on shutdown
    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_period)
    }

    /// Idle deadline for the surviving relay direction
    pub fn half_close_timeout(&self) -> Duration {
        Duration::from_secs(self.half_close_timeout)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), SocksdError> {
        if self.listen_host.trim().is_empty() {
            return Err(invalid("listen_host must not be empty"));
        }

        match (&self.username, &self.password) {
            (Some(_), None) => return Err(invalid("username is set but password is missing")),
            (None, Some(_)) => return Err(invalid("password is set but username is missing")),
            (Some(user), Some(pass)) => {
                check_credential("username", user)?;
                check_credential("password", pass)?;
            }
            (None, None) => {}
        }

        if self.handshake_timeout == 0 {
            return Err(invalid("handshake_timeout must be greater than zero"));
        }
        if self.connect_timeout == 0 {
            return Err(invalid("connect_timeout must be greater than zero"));
        }
        if !(MIN_RELAY_BUFFER_SIZE..=MAX_RELAY_BUFFER_SIZE).contains(&self.relay_buffer_size) {
            return Err(invalid(format!(
                "relay_buffer_size must be between {} and {} bytes",
                MIN_RELAY_BUFFER_SIZE, MAX_RELAY_BUFFER_SIZE
            )));
        }

        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> SocksdError {
    SocksdError::Config(reason.into())
}

fn check_credential(name: &str, value: &str) -> Result<(), SocksdError> {
    if value.is_empty() {
        return Err(invalid(format!("{} must not be empty", name)));
    }
    if value.len() > MAX_CREDENTIAL_LEN {
        return Err(invalid(format!(
            "{} must be at most {} bytes",
            name, MAX_CREDENTIAL_LEN
        )));
    }
    Ok(())
}

/// TCP socket options
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    /// Enable TCP_NODELAY
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,

    /// Keepalive idle time in seconds
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Keepalive probe interval in seconds
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            nodelay: default_nodelay(),
            keepalive_secs: default_keepalive_secs(),
            keepalive_interval: default_keepalive_interval(),
        }
    }
}
