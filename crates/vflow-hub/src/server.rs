// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bulk-data hub core implementation.
//!
//! Each rank on the node opens one TCP connection. The hub asks it to
//! identify, registers its `(hub, rank)` address and then relays
//! `RequestObject` and `SendObject` units to the rank named in their route.
//! When a rank disconnects, every other rank receives `PeerGone` so its
//! pending requests towards that rank can fail instead of hanging.

use crate::config::{ConfigError, HubConfig};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify, RwLock};
use tracing::{debug, error, info, warn};
use vflow::{BulkMessage, Identity};

pub mod connection;
pub mod router;

pub use connection::{ConnectionError, FrameReader, FrameWriter, Relayed};
pub use router::{RankId, RankRouter, RelayStats};

/// Hub error types.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Hub already running")]
    AlreadyRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Handshake failed: {0}")]
    Handshake(String),
}

/// Per-node bulk-data hub.
#[derive(Clone)]
pub struct BulkHub {
    config: Arc<HubConfig>,
    router: Arc<RwLock<RankRouter>>,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
}

impl BulkHub {
    /// Create a hub from a validated configuration.
    pub fn new(config: HubConfig) -> Result<Self, HubError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            router: Arc::new(RwLock::new(RankRouter::new())),
            shutdown: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), HubError> {
        let addr = SocketAddr::new(self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HubError::Bind(format!("{}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serve ranks connecting to an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), HubError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HubError::AlreadyRunning);
        }

        match listener.local_addr() {
            Ok(addr) => info!("Hub {} listening on {}", self.config.hub_id, addr),
            Err(e) => warn!("Hub {} listening on unknown address: {}", self.config.hub_id, e),
        }

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            debug!("New connection from {}", peer_addr);

                            let router = self.router.clone();
                            let config = self.config.clone();
                            let shutdown = self.shutdown.clone();

                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(
                                    stream,
                                    peer_addr,
                                    router,
                                    config,
                                    shutdown,
                                ).await {
                                    warn!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn handle_connection(
        stream: TcpStream,
        peer_addr: SocketAddr,
        router: Arc<RwLock<RankRouter>>,
        config: Arc<HubConfig>,
        shutdown: Arc<Notify>,
    ) -> Result<(), HubError> {
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half, config.max_message_size);
        let mut writer = FrameWriter::new(write_half);

        writer
            .send(&Relayed::header_only(BulkMessage::Identify {
                identity: Identity::Unknown,
                hub: config.hub_id,
                rank: -1,
            }))
            .await?;

        let first = tokio::time::timeout(config.handshake_timeout(), reader.read_message())
            .await
            .map_err(|_| HubError::Handshake(format!("{} did not identify in time", peer_addr)))??;
        let id: RankId = match first {
            Some(Relayed {
                header:
                    BulkMessage::Identify {
                        identity: Identity::LocalBulkData,
                        hub,
                        rank,
                    },
                ..
            }) => (hub, rank),
            Some(other) => {
                return Err(HubError::Handshake(format!(
                    "{} sent {} before identifying",
                    peer_addr,
                    other.header.kind_name()
                )));
            }
            None => {
                debug!("Connection closed before handshake: {}", peer_addr);
                return Ok(());
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::channel::<Relayed>(config.outbound_queue_depth);
        if router.write().await.register(id, outbound_tx.clone()) {
            warn!("Rank {}/{} reconnected, replacing older connection", id.0, id.1);
        }
        info!("Rank {}/{} identified from {}", id.0, id.1, peer_addr);

        let writer_task = tokio::spawn(Self::write_loop(writer, outbound_rx, id));

        loop {
            tokio::select! {
                result = reader.read_message() => {
                    match result {
                        Ok(Some(msg)) => Self::relay(id, msg, &router, &outbound_tx).await,
                        Ok(None) => {
                            info!("Rank {}/{} disconnected", id.0, id.1);
                            break;
                        }
                        Err(e) => {
                            warn!("Read error from rank {}/{}: {}", id.0, id.1, e);
                            break;
                        }
                    }
                }
                _ = shutdown.notified() => {
                    debug!("Connection handler shutting down: {}/{}", id.0, id.1);
                    break;
                }
            }
        }

        let removed = router.write().await.unregister(id, &outbound_tx);
        if removed {
            let gone = Relayed::header_only(BulkMessage::PeerGone {
                hub: id.0,
                rank: id.1,
            });
            let notified = router.read().await.broadcast(&gone, Some(id));
            debug!("Announced loss of {}/{} to {} ranks", id.0, id.1, notified);
        }
        writer_task.abort();
        Ok(())
    }

    async fn write_loop<W>(mut writer: FrameWriter<W>, mut rx: mpsc::Receiver<Relayed>, id: RankId)
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = writer.send(&msg).await {
                warn!("Failed to send {} to rank {}/{}: {}", msg.header.kind_name(), id.0, id.1, e);
                break;
            }
        }
        let _ = writer.shutdown().await;
    }

    /// Forward one unit received from `from` to the rank its route names.
    async fn relay(
        from: RankId,
        msg: Relayed,
        router: &Arc<RwLock<RankRouter>>,
        own_tx: &mpsc::Sender<Relayed>,
    ) {
        let route = match msg.header.route() {
            Some(route) => *route,
            None => {
                debug!(
                    "Ignoring {} from rank {}/{}",
                    msg.header.kind_name(),
                    from.0,
                    from.1
                );
                return;
            }
        };
        if route.sender() != from {
            debug!(
                "Rank {}/{} relays {} on behalf of {}/{}",
                from.0,
                from.1,
                msg.header.kind_name(),
                route.sender_hub,
                route.sender_rank
            );
        }

        let target = route.target();
        // Clone the queue out so the lock is not held across the send.
        let tx = router.read().await.route(target);
        let Some(tx) = tx else {
            warn!(
                "No rank {}/{} for {} from {}/{}",
                target.0,
                target.1,
                msg.header.kind_name(),
                from.0,
                from.1
            );
            router.write().await.record_error();
            let gone = Relayed::header_only(BulkMessage::PeerGone {
                hub: target.0,
                rank: target.1,
            });
            let _ = own_tx.try_send(gone);
            return;
        };

        match tx.reserve().await {
            Ok(permit) => {
                router.write().await.record_relay(msg.payload_len());
                permit.send(msg);
            }
            Err(_) => {
                warn!("Rank {}/{} queue closed", target.0, target.1);
                router.write().await.record_error();
            }
        };
    }

    /// Signal the hub and all connection handlers to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Number of identified ranks.
    pub async fn rank_count(&self) -> usize {
        self.router.read().await.connection_count()
    }

    pub async fn is_connected(&self, hub: i32, rank: i32) -> bool {
        self.router.read().await.is_connected((hub, rank))
    }

    pub async fn relay_stats(&self) -> RelayStats {
        self.router.read().await.stats().clone()
    }
}
