//! Main SOCKS5 handler
//!
//! Drives one client connection from greeting to close. A [`Session`] owns
//! the client stream, so both it and the destination stream are released
//! exactly once when the session ends.
//!
//! # Protocol Flow
//!
//! 1. Method negotiation (`AwaitingHandshake`)
//! 2. Username/password sub-negotiation if configured (`AwaitingAuth`)
//! 3. Request parsing (`AwaitingRequest`)
//! 4. CONNECT dial and relay (`Relaying`)
//!
//! Steps 1 to 3 share a single handshake deadline.

use crate::error::{Socks5Error, Socks5ReplyCode, SocksdError};
use crate::socks::auth::{negotiate_method, AuthFailure, AuthMethod, PasswordAuth};
use crate::socks::command::{parse_command, send_failure};
use crate::socks::tcp_relay::{connect_target, relay_tcp, RelayStats};
use crate::socks::types::{SocksCommand, TargetAddr};
use crate::socks::SocksContext;
use crate::transport::Connector;
use anyhow::Result;
use std::fmt;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

/// Lifecycle of a client session
///
/// States only move forward; any failure jumps straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Waiting for the version/methods greeting
    AwaitingHandshake,
    /// Waiting for username/password
    AwaitingAuth,
    /// Waiting for the request
    AwaitingRequest,
    /// Copying bytes between client and destination
    Relaying,
    /// Both sockets released
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::AwaitingHandshake => "AWAITING_HANDSHAKE",
            SessionState::AwaitingAuth => "AWAITING_AUTH",
            SessionState::AwaitingRequest => "AWAITING_REQUEST",
            SessionState::Relaying => "RELAYING",
            SessionState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// One accepted client connection
pub struct Session<S> {
    id: u64,
    peer: Option<SocketAddr>,
    stream: S,
    state: SessionState,
    auth_method: Option<AuthMethod>,
    target: Option<TargetAddr>,
}

impl<S> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("auth_method", &self.auth_method)
            .field("target", &self.target)
            .finish()
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a freshly accepted stream
    pub fn new(id: u64, peer: Option<SocketAddr>, stream: S) -> Self {
        Session {
            id,
            peer,
            stream,
            state: SessionState::AwaitingHandshake,
            auth_method: None,
            target: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion
    ///
    /// Returns the relay statistics when a tunnel was established. Every
    /// other outcome is an error describing why the session closed; the
    /// client has already been answered where the protocol calls for it.
    pub async fn run<C: Connector>(mut self, ctx: &SocksContext<C>) -> Result<RelayStats> {
        let deadline = tokio::time::timeout(ctx.handshake_timeout, self.negotiate(ctx)).await;
        let negotiated = match deadline {
            Ok(result) => result,
            Err(_) => Err(SocksdError::Timeout(format!(
                "handshake not completed within {:?} (state {})",
                ctx.handshake_timeout, self.state
            ))
            .into()),
        };

        let target = match negotiated {
            Ok(target) => target,
            Err(e) => return Err(self.close(e).await),
        };

        let target_stream = match connect_target(&mut self.stream, &target, &ctx.connector).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.close(e).await),
        };

        self.transition(SessionState::Relaying);
        let Session { id, stream, .. } = self;

        let stats = relay_tcp(stream, target_stream, &ctx.relay).await;
        debug!(
            session = id,
            "{} -> {}",
            SessionState::Relaying,
            SessionState::Closed
        );
        info!(
            "Tunnel to {} closed ({} bytes up, {} bytes down)",
            target, stats.client_to_target, stats.target_to_client
        );

        Ok(stats)
    }

    /// Greeting, optional auth and request
    async fn negotiate<C: Connector>(&mut self, ctx: &SocksContext<C>) -> Result<TargetAddr> {
        let method = negotiate_method(&mut self.stream, &ctx.credentials).await?;
        self.auth_method = Some(method);
        debug!(session = self.id, "Selected auth method: {:?}", method);

        if method == AuthMethod::Password {
            self.transition(SessionState::AwaitingAuth);

            let result = PasswordAuth::authenticate(&mut self.stream, &ctx.credentials).await?;
            if !result.success {
                return Err(match result.failure_reason {
                    Some(AuthFailure::UnsupportedVersion(v)) => {
                        Socks5Error::UnsupportedAuthVersion(v)
                    }
                    _ => Socks5Error::AuthFailed,
                }
                .into());
            }
        }

        self.transition(SessionState::AwaitingRequest);

        let (command, target) = match parse_command(&mut self.stream).await {
            Ok(request) => request,
            Err(e) => {
                if let Some(reply) = request_error_reply(&e) {
                    send_failure(&mut self.stream, reply).await?;
                }
                return Err(e);
            }
        };

        info!(session = self.id, "SOCKS5 {} request to {}", command, target);
        self.target = Some(target.clone());

        match command {
            SocksCommand::Connect => Ok(target),
            SocksCommand::Bind | SocksCommand::UdpAssociate => {
                send_failure(&mut self.stream, Socks5ReplyCode::CommandNotSupported).await?;
                Err(Socks5Error::CommandNotSupported(command.into()).into())
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(next > self.state, "{} -> {}", self.state, next);
        trace!(session = self.id, "{} -> {}", self.state, next);
        self.state = next;
    }

    /// Release the client stream after a failed session
    ///
    /// Shutting down first flushes any reply still queued.
    async fn close(mut self, err: anyhow::Error) -> anyhow::Error {
        if let Err(e) = self.stream.shutdown().await {
            trace!(session = self.id, "Shutdown after failure: {}", e);
        }
        trace!(session = self.id, "{} -> {}", self.state, SessionState::Closed);
        err
    }
}

/// Reply owed to the client for a request that failed to parse
///
/// Malformed requests (bad version, invalid domain, truncated) get none.
fn request_error_reply(err: &anyhow::Error) -> Option<Socks5ReplyCode> {
    match err.downcast_ref::<Socks5Error>() {
        Some(Socks5Error::CommandNotSupported(_)) => Some(Socks5ReplyCode::CommandNotSupported),
        Some(Socks5Error::AddressTypeNotSupported(_)) => {
            Some(Socks5ReplyCode::AddressTypeNotSupported)
        }
        _ => None,
    }
}

/// Handle SOCKS5 protocol on an accepted stream
///
/// This is the per-connection entry point used by the listener. It runs a
/// [`Session`] and logs how it ended; nothing is propagated since a single
/// session never affects the server.
pub async fn handle_socks5_on_stream<S, C>(
    stream: S,
    id: u64,
    peer: Option<SocketAddr>,
    ctx: &SocksContext<C>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    C: Connector,
{
    match Session::new(id, peer, stream).run(ctx).await {
        Ok(_) => debug!(session = id, "Session finished"),
        Err(e) => log_session_error(id, peer, &e),
    }
}

fn log_session_error(id: u64, peer: Option<SocketAddr>, err: &anyhow::Error) {
    let peer = peer.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());

    if let Some(socks_err) = err.downcast_ref::<Socks5Error>() {
        match socks_err {
            Socks5Error::AuthFailed | Socks5Error::UnsupportedAuthVersion(_) => {
                warn!(session = id, %peer, "Authentication failed: {}", socks_err)
            }
            Socks5Error::Unreachable { .. } => {
                info!(session = id, %peer, "{:#}", err)
            }
            e if e.is_protocol_violation() => {
                warn!(session = id, %peer, "Protocol violation: {}", e)
            }
            e => info!(session = id, %peer, "Request rejected: {}", e),
        }
        return;
    }

    if let Some(SocksdError::Timeout(msg)) = err.downcast_ref::<SocksdError>() {
        warn!(session = id, %peer, "Timeout: {}", msg);
        return;
    }

    // Client went away mid-handshake or similar
    debug!(session = id, %peer, "Session closed: {:#}", err);
}
