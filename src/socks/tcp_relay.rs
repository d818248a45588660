//! TCP relay for SOCKS5 CONNECT command
//!
//! Dials the CONNECT target, answers the client, and then relays data
//! bidirectionally.

use crate::error::{Socks5Error, Socks5ReplyCode};
use crate::socks::command::{send_failure, send_success};
use crate::socks::types::TargetAddr;
use crate::transport::Connector;
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Tuning for the relay phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOptions {
    /// Per-direction transfer buffer, allocated once and reused
    pub buffer_size: usize,
    /// How long the surviving direction may sit idle after the other ends
    pub half_close_timeout: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            buffer_size: 16 * 1024,
            half_close_timeout: Duration::from_secs(5),
        }
    }
}

/// Bytes moved in each direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Client to destination
    pub client_to_target: u64,
    /// Destination to client
    pub target_to_client: u64,
}

/// Dial the CONNECT target and answer the client
///
/// On success the client gets `SUCCEEDED` with the outbound socket's local
/// address and the destination stream is returned. On failure the io error
/// is mapped to the nearest reply code, that reply is sent, and the error
/// carries a [`Socks5Error::Unreachable`].
pub async fn connect_target<S, C>(
    client_stream: &mut S,
    target_addr: &TargetAddr,
    connector: &C,
) -> Result<C::Stream>
where
    S: AsyncWrite + Unpin,
    C: Connector,
{
    debug!("Connecting to target: {}", target_addr);

    match connector.connect(target_addr).await {
        Ok(target_stream) => {
            let local_addr = C::local_addr(&target_stream);
            send_success(client_stream, local_addr).await?;
            info!("SOCKS5 tunnel established to {}", target_addr);
            Ok(target_stream)
        }
        Err(e) => {
            let reply = Socks5ReplyCode::from(&e);
            warn!("Failed to connect to {}: {} (reply {:?})", target_addr, e, reply);
            send_failure(client_stream, reply).await?;
            Err(anyhow::Error::new(e).context(Socks5Error::Unreachable {
                target: target_addr.to_string(),
                reply,
            }))
        }
    }
}

/// Relay data bidirectionally between client and destination
///
/// Both directions are polled concurrently. When one direction reaches EOF
/// its write side is shut down on the peer, and the other direction keeps
/// running for as long as it moves bytes at least once per
/// `half_close_timeout`. An error in either direction drops both streams
/// immediately.
pub async fn relay_tcp<A, B>(client: A, target: B, options: &RelayOptions) -> RelayStats
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut target_read, mut target_write) = tokio::io::split(target);

    let client_to_target = AtomicU64::new(0);
    let target_to_client = AtomicU64::new(0);

    {
        let upstream = pipe(
            &mut client_read,
            &mut target_write,
            options.buffer_size,
            &client_to_target,
        );
        let downstream = pipe(
            &mut target_read,
            &mut client_write,
            options.buffer_size,
            &target_to_client,
        );
        tokio::pin!(upstream);
        tokio::pin!(downstream);

        tokio::select! {
            result = &mut upstream => match result {
                Ok(()) => {
                    debug!("Client closed its side, draining destination");
                    drain(
                        &mut downstream,
                        &target_to_client,
                        options.half_close_timeout,
                        "Destination->client",
                    )
                    .await;
                }
                Err(e) => debug!("Client->destination error: {}", e),
            },
            result = &mut downstream => match result {
                Ok(()) => {
                    debug!("Destination closed its side, draining client");
                    drain(
                        &mut upstream,
                        &client_to_target,
                        options.half_close_timeout,
                        "Client->destination",
                    )
                    .await;
                }
                Err(e) => debug!("Destination->client error: {}", e),
            },
        }
    }

    RelayStats {
        client_to_target: client_to_target.into_inner(),
        target_to_client: target_to_client.into_inner(),
    }
}

/// Let the surviving direction finish, closing it once it goes idle
///
/// The deadline restarts whenever `progress` moved during the last period.
async fn drain<F>(direction: &mut F, progress: &AtomicU64, idle: Duration, name: &str)
where
    F: std::future::Future<Output = std::io::Result<()>> + Unpin,
{
    loop {
        let seen = progress.load(Ordering::Relaxed);
        match tokio::time::timeout(idle, &mut *direction).await {
            Ok(Ok(())) => debug!("{} finished", name),
            Ok(Err(e)) => debug!("{} error: {}", name, e),
            Err(_) if progress.load(Ordering::Relaxed) != seen => continue,
            Err(_) => debug!("{} idle for {:?}, closing", name, idle),
        }
        break;
    }
}

/// Copy one direction through a single reusable buffer
///
/// On EOF the writer is shut down so the peer observes the half-close.
async fn pipe<R, W>(
    reader: &mut R,
    writer: &mut W,
    buffer_size: usize,
    transferred: &AtomicU64,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            writer.shutdown().await?;
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        transferred.fetch_add(n as u64, Ordering::Relaxed);
    }
}
