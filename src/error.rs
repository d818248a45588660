//! Error types for Socksd
//!
//! Server-level failures live in [`SocksdError`]; everything that only ends a
//! single session is a [`Socks5Error`].

use crate::socks::{
    SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED, SOCKS5_REPLY_COMMAND_NOT_SUPPORTED,
    SOCKS5_REPLY_CONNECTION_NOT_ALLOWED, SOCKS5_REPLY_CONNECTION_REFUSED,
    SOCKS5_REPLY_GENERAL_FAILURE, SOCKS5_REPLY_HOST_UNREACHABLE, SOCKS5_REPLY_NETWORK_UNREACHABLE,
    SOCKS5_REPLY_SUCCEEDED, SOCKS5_REPLY_TTL_EXPIRED,
};
use std::io;
use thiserror::Error;

/// Main error type for server-level operations
#[derive(Error, Debug)]
pub enum SocksdError {
    /// The listening socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: String,
        /// Underlying bind error
        #[source]
        source: io::Error,
    },

    /// The listening socket died while accepting
    #[error("Listener error: {0}")]
    Listener(#[source] io::Error),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),
}

impl SocksdError {
    /// Human readable reason for a bind failure
    pub fn bind_reason(&self) -> Option<&'static str> {
        match self {
            SocksdError::Bind { source, .. } => Some(match source.kind() {
                io::ErrorKind::AddrInUse => "address in use",
                io::ErrorKind::PermissionDenied => "permission denied",
                io::ErrorKind::AddrNotAvailable => "address not available",
                io::ErrorKind::InvalidInput => "invalid address",
                _ => "bind failed",
            }),
            _ => None,
        }
    }
}

/// SOCKS5 specific errors
///
/// These never escape a session; the session driver uses them to decide how
/// the closure is reported.
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// Unsupported SOCKS version
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// Greeting offered zero methods
    #[error("No authentication methods offered")]
    NoMethodsOffered,

    /// No acceptable authentication method
    #[error("No acceptable authentication method")]
    NoAcceptableMethod,

    /// Unsupported username/password sub-negotiation version
    #[error("Unsupported auth version: {0}")]
    UnsupportedAuthVersion(u8),

    /// Authentication failed
    #[error("Authentication failed")]
    AuthFailed,

    /// Command not supported
    #[error("Command not supported: {0}")]
    CommandNotSupported(u8),

    /// Address type not supported
    #[error("Address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    /// Destination could not be reached
    #[error("Destination {target} unreachable: {reply:?}")]
    Unreachable {
        /// Target as requested by the client
        target: String,
        /// Reply code sent to the client
        reply: Socks5ReplyCode,
    },

    /// Invalid domain name
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),
}

impl Socks5Error {
    /// Whether this error means the client broke the protocol
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Socks5Error::UnsupportedVersion(_)
                | Socks5Error::NoMethodsOffered
                | Socks5Error::UnsupportedAuthVersion(_)
                | Socks5Error::InvalidDomain(_)
        )
    }
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Socks5ReplyCode {
    /// Command succeeded
    Succeeded = SOCKS5_REPLY_SUCCEEDED,
    /// General SOCKS server failure
    GeneralFailure = SOCKS5_REPLY_GENERAL_FAILURE,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = SOCKS5_REPLY_CONNECTION_NOT_ALLOWED,
    /// Network unreachable
    NetworkUnreachable = SOCKS5_REPLY_NETWORK_UNREACHABLE,
    /// Host unreachable
    HostUnreachable = SOCKS5_REPLY_HOST_UNREACHABLE,
    /// Connection refused
    ConnectionRefused = SOCKS5_REPLY_CONNECTION_REFUSED,
    /// TTL expired
    TtlExpired = SOCKS5_REPLY_TTL_EXPIRED,
    /// Command not supported
    CommandNotSupported = SOCKS5_REPLY_COMMAND_NOT_SUPPORTED,
    /// Address type not supported
    AddressTypeNotSupported = SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED,
}

impl From<Socks5ReplyCode> for u8 {
    fn from(code: Socks5ReplyCode) -> Self {
        code as u8
    }
}

impl Socks5ReplyCode {
    /// Codes in wire order, so `ALL[code as usize] == code`
    pub const ALL: [Socks5ReplyCode; 9] = [
        Socks5ReplyCode::Succeeded,
        Socks5ReplyCode::GeneralFailure,
        Socks5ReplyCode::ConnectionNotAllowed,
        Socks5ReplyCode::NetworkUnreachable,
        Socks5ReplyCode::HostUnreachable,
        Socks5ReplyCode::ConnectionRefused,
        Socks5ReplyCode::TtlExpired,
        Socks5ReplyCode::CommandNotSupported,
        Socks5ReplyCode::AddressTypeNotSupported,
    ];
}

impl TryFrom<u8> for Socks5ReplyCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL.get(value as usize).copied().ok_or(value)
    }
}

impl From<&io::Error> for Socks5ReplyCode {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Socks5ReplyCode::ConnectionRefused,
            io::ErrorKind::NetworkUnreachable | io::ErrorKind::NetworkDown => {
                Socks5ReplyCode::NetworkUnreachable
            }
            io::ErrorKind::HostUnreachable
            | io::ErrorKind::TimedOut
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::NotFound => Socks5ReplyCode::HostUnreachable,
            io::ErrorKind::PermissionDenied => Socks5ReplyCode::ConnectionNotAllowed,
            _ => Socks5ReplyCode::GeneralFailure,
        }
    }
}
