//! TCP listener for incoming SOCKS5 clients

use crate::config::ServerConfig;
use crate::error::SocksdError;
use crate::helper::{is_transient_accept_error, RetryConfig};
use crate::socks::{handle_socks5_on_stream, SocksContext};
use crate::transport::{Connector, SocketOpts, TcpConnector};
use backoff::backoff::Backoff;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Requests a graceful stop of a running [`Server`]
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<bool>,
}

impl ShutdownHandle {
    /// Stop accepting and let in-flight sessions finish within the grace period
    pub fn shutdown(&self) {
        // No receiver means the server already stopped
        let _ = self.tx.send(true);
    }
}

/// A bound SOCKS5 server
pub struct Server<C: Connector = TcpConnector> {
    /// TCP listener
    listener: TcpListener,
    /// Address actually bound
    local_addr: SocketAddr,
    /// Shared per-session context
    ctx: Arc<SocksContext<C>>,
    /// Options applied to accepted sockets
    socket_opts: SocketOpts,
    /// Connection limit semaphore (None = unlimited)
    connection_semaphore: Option<Arc<Semaphore>>,
    max_connections: usize,
    /// How long sessions may run on after shutdown
    grace_period: Duration,
    /// Pacing for transient accept errors
    retry: RetryConfig,
    shutdown_tx: broadcast::Sender<bool>,
    shutdown_rx: broadcast::Receiver<bool>,
}

impl Server<TcpConnector> {
    /// Bind to the configured address with a plain TCP connector
    pub async fn bind(config: &ServerConfig) -> Result<Self, SocksdError> {
        Self::bind_with_connector(config, SocksContext::from_config(config)).await
    }
}

impl<C: Connector> Server<C> {
    /// Bind to the configured address, dialing targets through `ctx.connector`
    pub async fn bind_with_connector(
        config: &ServerConfig,
        ctx: SocksContext<C>,
    ) -> Result<Self, SocksdError> {
        config.validate()?;
        let addr = config.listen_addr();

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| SocksdError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| SocksdError::Bind { addr, source })?;

        // Create connection limit semaphore (0 = unlimited)
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        info!(
            "SOCKS5 server listening on {} ({}, {})",
            local_addr,
            if ctx.credentials.requires_auth() {
                "username/password auth"
            } else {
                "no auth"
            },
            match config.max_connections {
                0 => "unlimited connections".to_string(),
                n => format!("max {} connections", n),
            }
        );

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        Ok(Server {
            listener,
            local_addr,
            ctx: Arc::new(ctx),
            socket_opts: SocketOpts::from_tcp_config(&config.tcp),
            connection_semaphore,
            max_connections: config.max_connections,
            grace_period: config.shutdown_grace_period(),
            retry: RetryConfig::default(),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Get the local address the listener is bound to.
    ///
    /// This is useful when binding to port 0 to get an OS-assigned port.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for stopping the server from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Run the accept loop until shutdown or a fatal listener error
    pub async fn run(mut self) -> Result<(), SocksdError> {
        let mut sessions = JoinSet::new();
        let mut backoff = self.retry.to_backoff();
        let mut next_id: u64 = 0;

        let outcome = loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown requested, no longer accepting connections");
                    break Ok(());
                }

                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!("Session task panicked: {}", e);
                        }
                    }
                }

                result = self.listener.accept() => match result {
                    Ok((stream, peer)) => {
                        backoff.reset();
                        next_id += 1;
                        self.spawn_session(&mut sessions, stream, peer, next_id);
                    }
                    Err(e) if is_transient_accept_error(&e) => {
                        let delay = backoff.next_backoff().unwrap_or(self.retry.max_delay);
                        warn!("Transient accept error: {} (retrying in {:?})", e, delay);
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        error!("Listener on {} failed: {}", self.local_addr, e);
                        break Err(SocksdError::Listener(e));
                    }
                },
            }
        };

        drop(self.listener);
        drain_sessions(sessions, self.grace_period).await;
        info!("SOCKS5 server on {} stopped", self.local_addr);

        outcome
    }

    fn spawn_session(
        &self,
        sessions: &mut JoinSet<()>,
        stream: TcpStream,
        peer: SocketAddr,
        id: u64,
    ) {
        let Some(permit) = self.try_acquire_permit() else {
            warn!(
                "Connection from {} rejected: max connections ({}) reached",
                peer, self.max_connections
            );
            drop(stream);
            return;
        };

        if let Err(e) = self.socket_opts.apply(&stream) {
            debug!("Failed to apply socket options for {}: {}", peer, e);
        }

        debug!(session = id, "Accepted connection from {}", peer);

        let ctx = Arc::clone(&self.ctx);
        sessions.spawn(async move {
            let _permit = permit;
            handle_socks5_on_stream(stream, id, Some(peer), &ctx).await;
        });
    }

    /// Take a connection slot; `None` when the server is full
    fn try_acquire_permit(&self) -> Option<Option<OwnedSemaphorePermit>> {
        match &self.connection_semaphore {
            None => Some(None),
            Some(semaphore) => Arc::clone(semaphore).try_acquire_owned().ok().map(Some),
        }
    }
}

/// Wait for in-flight sessions, aborting whatever outlives the grace period
async fn drain_sessions(mut sessions: JoinSet<()>, grace_period: Duration) {
    if sessions.is_empty() {
        return;
    }

    info!(
        "Waiting up to {:?} for {} session(s) to finish",
        grace_period,
        sessions.len()
    );

    let finished = tokio::time::timeout(grace_period, async {
        while sessions.join_next().await.is_some() {}
    })
    .await
    .is_ok();

    if !finished {
        warn!(
            "Grace period elapsed, closing {} remaining session(s)",
            sessions.len()
        );
        sessions.abort_all();
        while sessions.join_next().await.is_some() {}
    }
}

/// Bind and serve until `shutdown_rx` fires or the listener dies
pub async fn run_server(
    config: ServerConfig,
    mut shutdown_rx: broadcast::Receiver<bool>,
) -> anyhow::Result<()> {
    let server = Server::bind(&config).await?;
    let handle = server.shutdown_handle();

    tokio::spawn(async move {
        if shutdown_rx.recv().await.is_ok() {
            handle.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
