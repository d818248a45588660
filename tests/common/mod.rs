//! Test utilities for Socksd
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use socksd::config::ServerConfig;
use socksd::server::{Server, ShutdownHandle};
use socksd::SocksdError;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Echo server that writes back everything it reads, one task per connection
pub async fn start_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    spawn_echo(listener);
    addr
}

/// Echo server bound to IPv6 loopback, `None` when the host has no IPv6
pub async fn start_echo_server_v6() -> Option<SocketAddr> {
    let listener = TcpListener::bind("[::1]:0").await.ok()?;
    let addr = listener.local_addr().ok()?;
    spawn_echo(listener);
    Some(addr)
}

fn spawn_echo(listener: TcpListener) {
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
}

/// Address that refuses connections
pub async fn closed_port_addr() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr
}

/// A server running in the background
pub struct TestServer {
    /// Address clients should connect to
    pub addr: SocketAddr,
    /// Stops the server
    pub shutdown: ShutdownHandle,
    /// Resolves once the accept loop exits
    pub task: JoinHandle<Result<(), SocksdError>>,
}

/// Bind and run a server for `config`
pub async fn start_test_server(config: ServerConfig) -> TestServer {
    let server = Server::bind(&config).await.unwrap();
    let addr = server.local_addr();
    let shutdown = server.shutdown_handle();
    let task = tokio::spawn(server.run());
    TestServer {
        addr,
        shutdown,
        task,
    }
}

/// Test configuration builder
pub struct TestConfigBuilder {
    credentials: Option<(String, String)>,
    handshake_timeout: u64,
    shutdown_grace_period: u64,
    max_connections: usize,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        TestConfigBuilder {
            credentials: None,
            handshake_timeout: 30,
            shutdown_grace_period: 1,
            max_connections: 0,
        }
    }
}

impl TestConfigBuilder {
    /// Create a new test config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Require username/password auth
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    /// Set handshake timeout in seconds
    pub fn handshake_timeout(mut self, secs: u64) -> Self {
        self.handshake_timeout = secs;
        self
    }

    /// Set shutdown grace period in seconds
    pub fn shutdown_grace_period(mut self, secs: u64) -> Self {
        self.shutdown_grace_period = secs;
        self
    }

    /// Limit concurrent sessions
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Build the configuration, listening on an ephemeral loopback port
    pub fn build(self) -> ServerConfig {
        let (username, password) = match self.credentials {
            Some((u, p)) => (Some(u), Some(p)),
            None => (None, None),
        };
        ServerConfig {
            listen_host: "127.0.0.1".to_string(),
            listen_port: 0,
            username,
            password,
            handshake_timeout: self.handshake_timeout,
            shutdown_grace_period: self.shutdown_grace_period,
            max_connections: self.max_connections,
            ..Default::default()
        }
    }
}

/// Mock SOCKS5 client messages
pub mod socks5_mock {
    use socksd::socks::*;
    use std::net::SocketAddr;

    /// Create a no-auth method selection request
    pub fn create_auth_request_no_auth() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE]
    }

    /// Create a password auth method selection request
    pub fn create_auth_request_password() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_PASSWORD]
    }

    /// Create a username/password sub-negotiation message
    pub fn create_password_auth(username: &str, password: &str) -> Vec<u8> {
        let mut msg = vec![SOCKS5_AUTH_VERSION, username.len() as u8];
        msg.extend_from_slice(username.as_bytes());
        msg.push(password.len() as u8);
        msg.extend_from_slice(password.as_bytes());
        msg
    }

    /// Create a request with an arbitrary command to a socket address
    pub fn create_request(command: u8, addr: SocketAddr) -> Vec<u8> {
        let mut cmd = vec![SOCKS5_VERSION, command, SOCKS5_RESERVED];
        match addr {
            SocketAddr::V4(v4) => {
                cmd.push(SOCKS5_ADDR_TYPE_IPV4);
                cmd.extend_from_slice(&v4.ip().octets());
            }
            SocketAddr::V6(v6) => {
                cmd.push(SOCKS5_ADDR_TYPE_IPV6);
                cmd.extend_from_slice(&v6.ip().octets());
            }
        }
        cmd.extend_from_slice(&addr.port().to_be_bytes());
        cmd
    }

    /// Create a connect command to a socket address
    pub fn create_connect(addr: SocketAddr) -> Vec<u8> {
        create_request(SOCKS5_CMD_TCP_CONNECT, addr)
    }

    /// Create a connect command to domain
    pub fn create_connect_domain(domain: &str, port: u16) -> Vec<u8> {
        let mut cmd = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_DOMAIN,
            domain.len() as u8,
        ];
        cmd.extend_from_slice(domain.as_bytes());
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }
}

/// Read a full reply to a request: header, address and port
pub async fn read_reply(stream: &mut TcpStream) -> Vec<u8> {
    let mut reply = vec![0u8; 4];
    stream.read_exact(&mut reply).await.unwrap();
    let addr_len = match reply[3] {
        0x01 => 4,
        0x04 => 16,
        other => panic!("unexpected reply address type {}", other),
    };
    let mut rest = vec![0u8; addr_len + 2];
    stream.read_exact(&mut rest).await.unwrap();
    reply.extend_from_slice(&rest);
    reply
}

/// Read exactly `n` bytes
pub async fn read_n(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).await.unwrap();
    buf
}

/// Read until the server closes, tolerating a reset
pub async fn read_until_close(stream: &mut TcpStream) -> Vec<u8> {
    let mut data = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return data,
            Ok(n) => data.extend_from_slice(&buf[..n]),
        }
    }
}

/// Connect to the server and complete a no-auth greeting
pub async fn connect_no_auth(server: SocketAddr) -> TcpStream {
    let mut client = TcpStream::connect(server).await.unwrap();
    client
        .write_all(&socks5_mock::create_auth_request_no_auth())
        .await
        .unwrap();
    assert_eq!(read_n(&mut client, 2).await, vec![0x05, 0x00]);
    client
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_server() {
        let addr = start_echo_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"hello").await.unwrap();
        assert_eq!(read_n(&mut stream, 5).await, b"hello");
    }

    #[test]
    fn test_config_builder() {
        let config = TestConfigBuilder::new()
            .credentials("user", "pass")
            .max_connections(2)
            .build();

        assert_eq!(config.username.as_deref(), Some("user"));
        assert_eq!(config.listen_port, 0);
        assert_eq!(config.max_connections, 2);
        assert!(config.validate().is_ok());
    }
}
