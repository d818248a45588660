//! Server module for Socksd
//!
//! Binds the listening socket and runs one session task per accepted
//! connection until shutdown.

mod listener;

pub use listener::{run_server, Server, ShutdownHandle};
