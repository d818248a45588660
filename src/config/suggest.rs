//! Suggested configuration values
//!
//! Random port and credentials an operator can accept or override when
//! setting up a new server. Nothing here is applied automatically.

use super::{Config, ServerConfig};
use rand::distributions::Uniform;
use rand::Rng;
use std::net::IpAddr;

const CREDENTIAL_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of generated usernames and passwords
pub const SUGGESTED_CREDENTIAL_LEN: usize = 6;

/// Port range suggestions are drawn from
pub const SUGGESTED_PORT_RANGE: std::ops::RangeInclusive<u16> = 10000..=20000;

/// A suggested server setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    /// Address clients should use to reach the server
    pub public_ip: IpAddr,
    /// Listen port
    pub port: u16,
    /// Username
    pub username: String,
    /// Password
    pub password: String,
}

impl Suggestion {
    /// Generate a suggestion with random port and credentials
    pub fn generate(public_ip: IpAddr) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            public_ip,
            port: rng.gen_range(SUGGESTED_PORT_RANGE),
            username: random_credential(&mut rng),
            password: random_credential(&mut rng),
        }
    }

    /// Configuration that would serve this suggestion
    pub fn to_config(&self) -> Config {
        Config {
            server: ServerConfig {
                listen_port: self.port,
                username: Some(self.username.clone()),
                password: Some(self.password.clone()),
                ..Default::default()
            },
        }
    }

    /// Telegram proxy share link for the suggestion
    pub fn share_link(&self) -> String {
        format!(
            "https://t.me/socks?server={}&port={}&user={}&pass={}",
            self.public_ip, self.port, self.username, self.password
        )
    }
}

fn random_credential<R: Rng>(rng: &mut R) -> String {
    let dist = Uniform::from(0..CREDENTIAL_ALPHABET.len());
    (0..SUGGESTED_CREDENTIAL_LEN)
        .map(|_| CREDENTIAL_ALPHABET[rng.sample(dist)] as char)
        .collect()
}
