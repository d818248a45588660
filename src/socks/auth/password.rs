//! Username/password authentication handler
//!
//! Implements RFC 1929 username/password authentication for SOCKS5.

use crate::socks::consts::{SOCKS5_AUTH_FAILURE, SOCKS5_AUTH_SUCCESS, SOCKS5_AUTH_VERSION};
use crate::socks::credentials::CredentialStore;
use anyhow::Result;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Why a sub-negotiation did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Client used a sub-negotiation version other than 0x01
    UnsupportedVersion(u8),
    /// Username or password did not match
    InvalidCredentials,
}

/// Outcome of a username/password exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthResult {
    /// Whether the client may proceed
    pub success: bool,
    /// Set when `success` is false
    pub failure_reason: Option<AuthFailure>,
}

impl AuthResult {
    /// Successful authentication
    pub fn success() -> Self {
        Self {
            success: true,
            failure_reason: None,
        }
    }

    /// Failed authentication
    pub fn failure(reason: AuthFailure) -> Self {
        Self {
            success: false,
            failure_reason: Some(reason),
        }
    }
}

/// Username/password authentication handler
pub struct PasswordAuth;

impl PasswordAuth {
    /// Perform username/password authentication
    ///
    /// # Protocol
    ///
    /// Client sends:
    /// ```text
    /// +----+------+----------+------+----------+
    /// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
    /// +----+------+----------+------+----------+
    /// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
    /// +----+------+----------+------+----------+
    /// ```
    ///
    /// Server responds:
    /// ```text
    /// +----+--------+
    /// |VER | STATUS |
    /// +----+--------+
    /// | 1  |   1    |
    /// +----+--------+
    /// ```
    ///
    /// The status reply is always sent before returning an [`AuthResult`];
    /// an `Err` means the exchange itself broke (EOF, reset).
    pub async fn authenticate<S>(stream: &mut S, credentials: &CredentialStore) -> Result<AuthResult>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let version = stream.read_u8().await?;
        if version != SOCKS5_AUTH_VERSION {
            send_auth_result(stream, SOCKS5_AUTH_FAILURE).await?;
            return Ok(AuthResult::failure(AuthFailure::UnsupportedVersion(version)));
        }

        let username = read_field(stream).await?;
        let password = read_field(stream).await?;

        if credentials.verify(&username, &password) {
            send_auth_result(stream, SOCKS5_AUTH_SUCCESS).await?;
            tracing::debug!(
                "Authentication successful for user: {}",
                String::from_utf8_lossy(&username)
            );
            Ok(AuthResult::success())
        } else {
            send_auth_result(stream, SOCKS5_AUTH_FAILURE).await?;
            tracing::debug!(
                "Authentication failed for user: {}",
                String::from_utf8_lossy(&username)
            );
            Ok(AuthResult::failure(AuthFailure::InvalidCredentials))
        }
    }
}

/// Read a length-prefixed field
async fn read_field<S: AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<Vec<u8>> {
    let len = stream.read_u8().await? as usize;
    let mut field = vec![0u8; len];
    stream.read_exact(&mut field).await?;
    Ok(field)
}

/// Send authentication result to client
async fn send_auth_result<S: AsyncWrite + Unpin>(stream: &mut S, status: u8) -> Result<()> {
    stream.write_all(&[SOCKS5_AUTH_VERSION, status]).await?;
    stream.flush().await?;
    Ok(())
}
