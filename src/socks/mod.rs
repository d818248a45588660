//! SOCKS5 module for Socksd
//!
//! Implements the server side of SOCKS5 (RFC 1928) with optional
//! username/password authentication (RFC 1929). Only CONNECT is served;
//! BIND and UDP ASSOCIATE are refused with `COMMAND_NOT_SUPPORTED`.

mod auth;
mod command;
mod consts;
mod credentials;
mod handler;
mod tcp_relay;
mod types;

pub use auth::{negotiate_method, AuthFailure, AuthMethod, AuthResult, PasswordAuth};
pub use command::{build_reply, encode_reply, parse_command, send_failure, send_success};
pub use consts::*;
pub use credentials::CredentialStore;
pub use handler::{handle_socks5_on_stream, Session, SessionState};
pub use tcp_relay::{connect_target, relay_tcp, RelayOptions, RelayStats};
pub use types::{SocksCommand, TargetAddr};

use crate::config::ServerConfig;
use crate::transport::{Connector, SocketOpts, TcpConnector};
use std::time::Duration;

/// Everything a session needs from the server, shared read-only
#[derive(Debug)]
pub struct SocksContext<C: Connector = TcpConnector> {
    /// Configured credentials, or none
    pub credentials: CredentialStore,
    /// Deadline for greeting, auth and request together
    pub handshake_timeout: Duration,
    /// Relay tuning
    pub relay: RelayOptions,
    /// Dials CONNECT targets
    pub connector: C,
}

impl SocksContext<TcpConnector> {
    /// Build the context for a plain TCP server
    pub fn from_config(config: &ServerConfig) -> Self {
        let connector = TcpConnector::with_defaults()
            .with_socket_opts(SocketOpts::from_tcp_config(&config.tcp))
            .with_connect_timeout(config.connect_timeout());

        Self::with_connector(config, connector)
    }
}

impl<C: Connector> SocksContext<C> {
    /// Build a context that dials through `connector`
    pub fn with_connector(config: &ServerConfig, connector: C) -> Self {
        SocksContext {
            credentials: CredentialStore::from_config(config),
            handshake_timeout: config.handshake_timeout(),
            relay: RelayOptions {
                buffer_size: config.relay_buffer_size,
                half_close_timeout: config.half_close_timeout(),
            },
            connector,
        }
    }
}
