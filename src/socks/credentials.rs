//! Credential store
//!
//! Read-only username/password set shared by every session.

use crate::config::ServerConfig;
use std::fmt;
use subtle::ConstantTimeEq;

/// Configured credentials, or no-auth mode
///
/// Built once at startup and never mutated; sessions share it through the
/// server's `Arc`ed context without locking.
#[derive(Clone, Default)]
pub struct CredentialStore {
    credentials: Option<(Vec<u8>, Vec<u8>)>,
}

impl CredentialStore {
    /// Store that requires no authentication
    pub fn no_auth() -> Self {
        Self { credentials: None }
    }

    /// Store with a single username/password pair
    pub fn with_credentials(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Some((
                username.into().into_bytes(),
                password.into().into_bytes(),
            )),
        }
    }

    /// Build from server configuration
    pub fn from_config(config: &ServerConfig) -> Self {
        match (&config.username, &config.password) {
            (Some(user), Some(pass)) => Self::with_credentials(user.clone(), pass.clone()),
            _ => Self::no_auth(),
        }
    }

    /// Whether clients must authenticate
    pub fn requires_auth(&self) -> bool {
        self.credentials.is_some()
    }

    /// Check a username/password pair
    ///
    /// Both fields are always compared so a wrong username costs the same as
    /// a wrong password. In no-auth mode nothing verifies.
    pub fn verify(&self, username: &[u8], password: &[u8]) -> bool {
        match &self.credentials {
            Some((user, pass)) => {
                let user_ok = user.as_slice().ct_eq(username);
                let pass_ok = pass.as_slice().ct_eq(password);
                (user_ok & pass_ok).into()
            }
            None => false,
        }
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("requires_auth", &self.requires_auth())
            .finish()
    }
}
