//! SOCKS5 authentication module
//!
//! Handles method negotiation and username/password authentication.

mod password;

pub use password::{AuthFailure, AuthResult, PasswordAuth};

use super::consts::*;
use super::credentials::CredentialStore;
use crate::error::Socks5Error;
use anyhow::Result;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Authentication method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication required
    None,
    /// Username/password authentication
    Password,
}

impl AuthMethod {
    /// Convert to SOCKS5 method byte
    pub fn to_byte(self) -> u8 {
        match self {
            AuthMethod::None => SOCKS5_AUTH_METHOD_NONE,
            AuthMethod::Password => SOCKS5_AUTH_METHOD_PASSWORD,
        }
    }

    /// Parse from SOCKS5 method byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_AUTH_METHOD_NONE => Some(AuthMethod::None),
            SOCKS5_AUTH_METHOD_PASSWORD => Some(AuthMethod::Password),
            _ => None,
        }
    }
}

/// Perform the greeting and method selection
///
/// # Protocol
///
/// ```text
/// client: +----+----------+----------+    server: +----+--------+
///         |VER | NMETHODS | METHODS  |            |VER | METHOD |
///         | 1  |    1     | 1 to 255 |            | 1  |   1    |
///         +----+----------+----------+            +----+--------+
/// ```
///
/// A wrong version or an empty method list is a protocol violation and is
/// answered with nothing. If no offered method is acceptable the client gets
/// `05 FF` before the error is returned.
pub async fn negotiate_method<S>(stream: &mut S, credentials: &CredentialStore) -> Result<AuthMethod>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    let version = buf[0];
    let num_methods = buf[1];

    if version != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(version).into());
    }

    if num_methods == 0 {
        return Err(Socks5Error::NoMethodsOffered.into());
    }

    let mut methods = vec![0u8; num_methods as usize];
    stream.read_exact(&mut methods).await?;

    let selected = select_auth_method(&methods, credentials);

    stream
        .write_all(&[
            SOCKS5_VERSION,
            selected
                .map(|m| m.to_byte())
                .unwrap_or(SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE),
        ])
        .await?;
    stream.flush().await?;

    match selected {
        Some(method) => Ok(method),
        None => Err(Socks5Error::NoAcceptableMethod.into()),
    }
}

/// Select the method the server will use
///
/// Exactly one method is acceptable for a given store: password when
/// credentials are configured, none otherwise. The client's order does not
/// matter since at most one offered method can match.
fn select_auth_method(methods: &[u8], credentials: &CredentialStore) -> Option<AuthMethod> {
    let wanted = if credentials.requires_auth() {
        AuthMethod::Password
    } else {
        AuthMethod::None
    };

    methods
        .iter()
        .filter_map(|&m| AuthMethod::from_byte(m))
        .find(|&m| m == wanted)
}
