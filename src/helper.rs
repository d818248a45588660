//! Helper utilities for Socksd
//!
//! This module provides common utility functions used throughout the application.

use backoff::ExponentialBackoff;
use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Duration;

/// Retry pacing for the accept loop
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Build a backoff that never gives up
    ///
    /// Jitter is disabled so delays are predictable; callers reset the
    /// backoff after every success.
    pub fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_delay,
            initial_interval: self.initial_delay,
            randomization_factor: 0.0,
            multiplier: self.multiplier,
            max_interval: self.max_delay,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Whether an `accept()` failure is worth retrying
///
/// Aborted handshakes, resource exhaustion (EMFILE, ENFILE, ENOBUFS, ENOMEM)
/// and network errors that belong to the pending connection rather than the
/// listening socket all clear up on their own. Anything else means the
/// listener itself is broken.
pub fn is_transient_accept_error(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::OutOfMemory
            | io::ErrorKind::NetworkDown
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::HostUnreachable
    ) {
        return true;
    }

    err.raw_os_error().is_some_and(is_transient_errno)
}

// accept(2) on Linux passes pending network errors of the new connection
// through; they must be retried like EAGAIN.
#[cfg(target_os = "linux")]
fn is_transient_errno(code: i32) -> bool {
    const ENOMEM: i32 = 12;
    const ENFILE: i32 = 23;
    const EMFILE: i32 = 24;
    const ENONET: i32 = 64;
    const EPROTO: i32 = 71;
    const ENOPROTOOPT: i32 = 92;
    const EOPNOTSUPP: i32 = 95;
    const ENETDOWN: i32 = 100;
    const ENETUNREACH: i32 = 101;
    const ENOBUFS: i32 = 105;
    const EHOSTDOWN: i32 = 112;
    const EHOSTUNREACH: i32 = 113;
    matches!(
        code,
        ENOMEM
            | ENFILE
            | EMFILE
            | ENONET
            | EPROTO
            | ENOPROTOOPT
            | EOPNOTSUPP
            | ENETDOWN
            | ENETUNREACH
            | ENOBUFS
            | EHOSTDOWN
            | EHOSTUNREACH
    )
}

// BSD-derived numbering (macOS, FreeBSD, OpenBSD, NetBSD)
#[cfg(all(unix, not(target_os = "linux")))]
fn is_transient_errno(code: i32) -> bool {
    const ENOMEM: i32 = 12;
    const ENFILE: i32 = 23;
    const EMFILE: i32 = 24;
    const ENOBUFS: i32 = 55;
    matches!(code, ENOMEM | ENFILE | EMFILE | ENOBUFS)
}

#[cfg(not(unix))]
fn is_transient_errno(_code: i32) -> bool {
    false
}

/// Best guess at this host's outward facing address
///
/// Connecting a UDP socket sends nothing; it only makes the kernel pick the
/// source address it would route through. Falls back to loopback offline.
pub fn local_ip() -> IpAddr {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
