//! RPC Server
//!
//! ## Purpose
//!
//! Binds the configured listener and runs the accept loop. Every accepted
//! stream gets its own connection task sharing one [`RequestPipeline`],
//! one [`StatsTracker`] and one [`ConnectionRegistry`].
//!
//! ## Integration Points
//!
//! - **Input**: TCP or Unix domain socket connections
//! - **Dispatch**: [`HandlerRegistry`] plus an [`Executor`] supplied by the caller
//! - **Observability**: optional [`ObservabilitySink`]; periodic stats log
//!
//! ## Shutdown
//!
//! `run_until` returns once its shutdown future resolves: accepting stops,
//! every connection is closed, connection tasks are awaited, and the stats
//! tracker is shut down.

use crate::config::{ListenAddress, ServerConfig};
use crate::dispatch::{Dispatcher, Executor, HandlerRegistry};
use crate::error::{Result, TransportError};
use crate::protocol::{RequestPipeline, ResponseEncoder};
use crate::stats::{ObservabilitySink, StatsTracker};
use crate::transports::connection::{serve_connection, ConnectionHandle, ConnectionSettings};
use crate::transports::ConnectionRegistry;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Tracker name used for the server's request statistics
pub const SERVER_STATS_NAME: &str = "rpc-server";

enum Listener {
    Tcp(TcpListener),
    Unix { listener: UnixListener, path: PathBuf },
}

enum Accepted {
    Tcp(TcpStream, String),
    Unix(UnixStream),
}

impl Listener {
    async fn bind(address: &ListenAddress) -> Result<Self> {
        match address {
            ListenAddress::Tcp { address } => {
                let listener = TcpListener::bind(address).await.map_err(|e| {
                    TransportError::network_with_source(
                        format!("Failed to bind TCP listener on {address}"),
                        e,
                    )
                })?;
                Ok(Listener::Tcp(listener))
            }
            ListenAddress::Unix { path } => {
                // Remove a stale socket left by a previous run
                if path.exists() {
                    std::fs::remove_file(path).map_err(|e| {
                        TransportError::network_with_source("Failed to remove existing socket", e)
                    })?;
                }
                let listener = UnixListener::bind(path).map_err(|e| {
                    TransportError::network_with_source("Failed to bind Unix socket", e)
                })?;
                Ok(Listener::Unix {
                    listener,
                    path: path.clone(),
                })
            }
        }
    }

    async fn accept(&self) -> std::io::Result<Accepted> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                // Small request/response frames; don't wait to coalesce
                stream.set_nodelay(true)?;
                Ok(Accepted::Tcp(stream, peer.to_string()))
            }
            Listener::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                Ok(Accepted::Unix(stream))
            }
        }
    }

    fn local_addr(&self) -> Result<ListenAddress> {
        match self {
            Listener::Tcp(listener) => Ok(ListenAddress::Tcp {
                address: listener.local_addr()?,
            }),
            Listener::Unix { path, .. } => Ok(ListenAddress::Unix { path: path.clone() }),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Listener::Unix { path, .. } = self {
            if path.exists() {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

/// Bound, not yet running, RPC server
pub struct RpcServer {
    config: ServerConfig,
    listener: Listener,
    pipeline: Arc<RequestPipeline>,
    connections: Arc<ConnectionRegistry>,
    tracker: StatsTracker,
    sink: Option<Arc<dyn ObservabilitySink>>,
}

impl RpcServer {
    /// Validate `config`, bind its listener and start the stats tracker
    pub async fn bind(
        config: ServerConfig,
        registry: HandlerRegistry,
        executor: Arc<dyn Executor>,
        sink: Option<Arc<dyn ObservabilitySink>>,
    ) -> Result<Self> {
        config.validate()?;
        let listener = Listener::bind(&config.listen).await?;

        let tracker = StatsTracker::start(&config.stats, SERVER_STATS_NAME, sink.clone());
        let dispatcher = Dispatcher::new(Arc::new(registry), executor);
        let pipeline = Arc::new(RequestPipeline::new(
            dispatcher,
            ResponseEncoder::new(tracker.clone()),
        ));
        let connections = Arc::new(ConnectionRegistry::new(config.max_connections));

        info!(
            listen = %listener.local_addr()?,
            ordering = ?config.response_ordering,
            message_types = pipeline.dispatcher().registry().len(),
            "RPC server bound"
        );

        Ok(Self {
            config,
            listener,
            pipeline,
            connections,
            tracker,
            sink,
        })
    }

    /// Actual listen address (with the OS-assigned port for `:0`)
    pub fn local_addr(&self) -> Result<ListenAddress> {
        self.listener.local_addr()
    }

    pub fn connections(&self) -> Arc<ConnectionRegistry> {
        self.connections.clone()
    }

    pub fn stats(&self) -> StatsTracker {
        self.tracker.clone()
    }

    /// Serve until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let settings = ConnectionSettings {
            max_frame_size: self.config.max_frame_size,
            ordering: self.config.response_ordering,
        };

        let reporter = self.config.stats.report_interval().map(|interval| {
            tokio::spawn(report_stats(
                self.tracker.clone(),
                self.sink.clone(),
                interval,
                shutdown_rx.clone(),
            ))
        });

        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(Accepted::Tcp(stream, peer)) => {
                        self.spawn_connection(&mut tasks, stream, peer, settings, &shutdown_rx);
                    }
                    Ok(Accepted::Unix(stream)) => {
                        self.spawn_connection(&mut tasks, stream, "unix".to_string(), settings, &shutdown_rx);
                    }
                    Err(err) => {
                        error!(error = %err, "Failed to accept connection");
                        // Back off so descriptor exhaustion does not spin the loop
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = finished {
                        error!(error = %err, "Connection task failed");
                    }
                }
            }
        }

        let _ = shutdown_tx.send(true);
        self.connections.close_all();
        while let Some(finished) = tasks.join_next().await {
            if let Err(err) = finished {
                error!(error = %err, "Connection task failed");
            }
        }

        if let Some(reporter) = reporter {
            let _ = reporter.await;
        }
        self.tracker.shutdown();
        info!("RPC server stopped");
        Ok(())
    }

    fn spawn_connection<S>(
        &self,
        tasks: &mut JoinSet<()>,
        stream: S,
        peer: String,
        settings: ConnectionSettings,
        shutdown: &watch::Receiver<bool>,
    ) where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (handle, commands) = ConnectionHandle::channel(peer);
        if let Err(err) = self.connections.register(handle.clone()) {
            warn!(peer = handle.peer(), error = %err, "Refusing connection");
            return;
        }

        let id = handle.id();
        let pipeline = self.pipeline.clone();
        let connections = self.connections.clone();
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            serve_connection(stream, handle, commands, pipeline, settings, shutdown).await;
            connections.remove(id);
        });
    }
}

async fn report_stats(
    tracker: StatsTracker,
    sink: Option<Arc<dyn ObservabilitySink>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = tracker.snapshot();
                info!(
                    requests_per_second = snapshot.requests_per_second,
                    average_processing_time_ms = snapshot.average_processing_time_ms,
                    total_requests = snapshot.total_requests,
                    "Request statistics"
                );
                if let Some(sink) = &sink {
                    sink.publish();
                }
            }
            _ = shutdown.changed() => {
                debug!("Stats reporter stopping");
                break;
            }
        }
    }
}
