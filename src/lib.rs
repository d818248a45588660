//! # Socksd - SOCKS5 Proxy Server
//!
//! Socksd is a standalone SOCKS5 server (RFC 1928) with optional
//! username/password authentication (RFC 1929). It relays TCP CONNECT
//! requests between clients and their destinations.
//!
//! ## Features
//!
//! - **CONNECT Only**: BIND and UDP ASSOCIATE are refused with a proper reply
//! - **Optional Auth**: no-auth, or a single username/password pair
//! - **Bounded Resources**: fixed-size relay buffers, handshake and connect
//!   deadlines, optional connection limit
//! - **Graceful Shutdown**: in-flight sessions get a grace period
//!
//! ## Usage
//!
//! ```rust,ignore
//! use socksd::config::load_config;
//! use socksd::server::run_server;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_server(config.server, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SOCKS5 Client -> Listener -> Session (handshake, auth, request) -> Relay -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod helper;
pub mod server;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config, ServerConfig};
pub use error::{Socks5Error, SocksdError};
pub use server::{run_server, Server, ShutdownHandle};

/// Version of the Socksd library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
