//! Transport module for Socksd
//!
//! Socket tuning shared by accepted and dialed connections, and the
//! [`Connector`] abstraction the request dispatcher dials through.

mod tcp;

pub use tcp::TcpConnector;

use crate::config::TcpConfig;
use crate::socks::TargetAddr;
use async_trait::async_trait;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Socket options for configuring connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(20),
            keepalive_interval: Some(8),
        }
    }
}

impl SocketOpts {
    /// Create socket options from TCP config
    ///
    /// A zero keepalive time disables keepalive.
    pub fn from_tcp_config(config: &TcpConfig) -> Self {
        let keepalive = config.keepalive_secs > 0;
        SocketOpts {
            nodelay: config.nodelay,
            keepalive_secs: keepalive.then_some(config.keepalive_secs),
            keepalive_interval: (keepalive && config.keepalive_interval > 0)
                .then_some(config.keepalive_interval),
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let Some(timeout) = self.keepalive_secs {
            let socket = socket2::SockRef::from(stream);
            let mut keepalive = socket2::TcpKeepalive::new().with_time(Duration::from_secs(timeout));
            if let Some(interval) = self.keepalive_interval {
                keepalive = keepalive.with_interval(Duration::from_secs(interval));
            }
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}

/// Outbound dialing for CONNECT requests
///
/// Errors are plain `io::Error`s whose kind decides the SOCKS5 reply code,
/// so implementations should map resolution failures and timeouts onto
/// `NotFound` / `TimedOut` rather than `Other`.
#[async_trait]
pub trait Connector: Debug + Send + Sync + 'static {
    /// The stream type produced by this connector
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Resolve and connect to the target
    async fn connect(&self, target: &TargetAddr) -> std::io::Result<Self::Stream>;

    /// Local address of an established stream, reported as BND.ADDR
    fn local_addr(_stream: &Self::Stream) -> Option<SocketAddr> {
        None
    }
}
