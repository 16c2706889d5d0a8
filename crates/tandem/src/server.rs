//! `TandemServer` builder and accept loop.
//!
//! Ties the layers together: TCP listener → WebSocket upgrade → per
//! connection handler → pairing coordinator.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tandem_pairing::{CoordinatorHandle, PairingConfig, spawn_coordinator};
use tandem_protocol::{CallerId, Codec, JsonCodec};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::handler::handle_connection;
use crate::{Authenticator, ServerConfig, TandemError};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<A: Authenticator, C: Codec> {
    pub(crate) coordinator: CoordinatorHandle,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) hello_timeout: Duration,
    pub(crate) heartbeat_interval: Duration,
    /// Origin for the millisecond timestamps sent to clients.
    pub(crate) started: Instant,
    /// Newest connection generation per caller.
    pub(crate) connections: Mutex<HashMap<CallerId, u64>>,
    pub(crate) next_connection: AtomicU64,
}

impl<A: Authenticator, C: Codec> ServerState<A, C> {
    /// Records a new connection for `caller`, superseding any earlier one.
    pub(crate) async fn register(&self, caller: &CallerId) -> u64 {
        let mut connections = self.connections.lock().await;
        let generation = self.next_connection.fetch_add(1, Ordering::Relaxed);
        if connections.insert(caller.clone(), generation).is_some() {
            tracing::info!(%caller, generation, "caller reconnected, older connection superseded");
        }
        generation
    }

    /// Removes `caller` from the coordinator unless a newer connection now
    /// owns it.
    pub(crate) async fn release(&self, caller: &CallerId, generation: u64) {
        let mut connections = self.connections.lock().await;
        if connections.get(caller) != Some(&generation) {
            tracing::debug!(%caller, generation, "superseded connection closed, keeping pairing state");
            return;
        }
        connections.remove(caller);
        // Lock held until the leave lands, so a reconnect registering
        // meanwhile is ordered after it.
        if self.coordinator.leave(caller.clone()).await.is_err() {
            tracing::debug!(%caller, "coordinator gone, nothing to leave");
        }
    }
}

/// Builder for configuring and starting a Tandem server.
///
/// # Example
///
/// ```rust,no_run
/// use tandem::prelude::*;
///
/// # async fn run() -> Result<(), TandemError> {
/// let server = TandemServer::builder()
///     .bind("0.0.0.0:9092")
///     .build(TrustedToken)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct TandemServerBuilder {
    config: ServerConfig,
}

impl TandemServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Starts from a fully loaded config, e.g. [`ServerConfig::from_env`].
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_address = addr.to_string();
        self
    }

    /// Sets the pairing timeouts.
    pub fn pairing_config(mut self, config: PairingConfig) -> Self {
        self.config.pairing = config;
        self
    }

    /// Sets how long a new connection may take to send `Hello`.
    pub fn hello_timeout(mut self, timeout: Duration) -> Self {
        self.config.hello_timeout = timeout;
        self
    }

    /// Binds the listener, spawns the coordinator, and returns the server.
    ///
    /// Frames are JSON text ([`JsonCodec`]).
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<TandemServer<A, JsonCodec>, TandemError> {
        let listener = TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            "tandem listening"
        );

        let state = Arc::new(ServerState {
            coordinator: spawn_coordinator(self.config.pairing.clone()),
            auth,
            codec: JsonCodec,
            hello_timeout: self.config.hello_timeout,
            heartbeat_interval: self.config.heartbeat_interval(),
            started: Instant::now(),
            connections: Mutex::new(HashMap::new()),
            next_connection: AtomicU64::new(1),
        });

        Ok(TandemServer { listener, state })
    }
}

impl Default for TandemServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Tandem server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct TandemServer<A: Authenticator, C: Codec> {
    listener: TcpListener,
    state: Arc<ServerState<A, C>>,
}

impl TandemServer<crate::TrustedToken, JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> TandemServerBuilder {
        TandemServerBuilder::new()
    }
}

impl<A, C> TandemServer<A, C>
where
    A: Authenticator,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the pairing coordinator behind this server.
    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.state.coordinator
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), TandemError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then stops the
    /// coordinator.
    ///
    /// Open connections see the coordinator go away and close on their own.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), TandemError> {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested, no longer accepting");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, state).await {
                                tracing::debug!(
                                    %peer,
                                    error = %e,
                                    "connection ended with error"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        if self.state.coordinator.shutdown().await.is_err() {
            tracing::debug!("coordinator already stopped");
        }
        Ok(())
    }
}
