// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Routing table of identified ranks.
//!
//! Every identified rank owns an outbound queue drained by its writer task.
//! `RequestObject` and `SendObject` units are pushed onto the queue of the
//! rank addressed by their route.

use super::connection::Relayed;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// `(hub, rank)` address of a connected rank.
pub type RankId = (i32, i32);

/// Relay statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayStats {
    /// Total messages relayed.
    pub messages_relayed: u64,
    /// Total payload bytes relayed.
    pub bytes_relayed: u64,
    /// Messages that could not be delivered.
    pub relay_errors: u64,
    /// Ranks that disconnected after identifying.
    pub peers_lost: u64,
}

/// Connected ranks indexed by address.
#[derive(Default)]
pub struct RankRouter {
    connections: HashMap<RankId, mpsc::Sender<Relayed>>,
    stats: RelayStats,
}

impl RankRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the outbound queue of `id`.
    ///
    /// Returns `true` if an older connection for the same address was
    /// replaced.
    pub fn register(&mut self, id: RankId, tx: mpsc::Sender<Relayed>) -> bool {
        self.connections.insert(id, tx).is_some()
    }

    /// Remove `id` if it is still served by `tx`.
    ///
    /// A rank that reconnected has replaced the entry already; the stale
    /// connection must not remove it.
    pub fn unregister(&mut self, id: RankId, tx: &mpsc::Sender<Relayed>) -> bool {
        match self.connections.get(&id) {
            Some(current) if current.same_channel(tx) => {
                self.connections.remove(&id);
                self.stats.peers_lost += 1;
                true
            }
            _ => false,
        }
    }

    /// Outbound queue of `id`, if connected.
    pub fn route(&self, id: RankId) -> Option<mpsc::Sender<Relayed>> {
        self.connections.get(&id).cloned()
    }

    pub fn record_relay(&mut self, payload_bytes: usize) {
        self.stats.messages_relayed += 1;
        self.stats.bytes_relayed += payload_bytes as u64;
    }

    pub fn record_error(&mut self) {
        self.stats.relay_errors += 1;
    }

    /// Queue `msg` for every rank except `exclude` without waiting.
    ///
    /// Returns the number of ranks the message was queued for.
    pub fn broadcast(&self, msg: &Relayed, exclude: Option<RankId>) -> usize {
        let mut sent = 0;
        for (id, tx) in &self.connections {
            if exclude != Some(*id) && tx.try_send(msg.clone()).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_connected(&self, id: RankId) -> bool {
        self.connections.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vflow::BulkMessage;

    fn gone(hub: i32, rank: i32) -> Relayed {
        Relayed::header_only(BulkMessage::PeerGone { hub, rank })
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let mut router = RankRouter::new();
        let (tx, _rx) = mpsc::channel(10);

        assert!(!router.register((0, 1), tx.clone()));
        assert!(router.is_connected((0, 1)));
        assert_eq!(router.connection_count(), 1);

        assert!(router.unregister((0, 1), &tx));
        assert!(!router.is_connected((0, 1)));
        assert_eq!(router.stats().peers_lost, 1);
    }

    #[tokio::test]
    async fn test_stale_connection_keeps_replacement() {
        let mut router = RankRouter::new();
        let (old_tx, _old_rx) = mpsc::channel(10);
        let (new_tx, mut new_rx) = mpsc::channel(10);

        router.register((0, 1), old_tx.clone());
        assert!(router.register((0, 1), new_tx));
        assert!(!router.unregister((0, 1), &old_tx));
        assert!(router.is_connected((0, 1)));

        let tx = router.route((0, 1)).unwrap();
        tx.send(gone(9, 9)).await.unwrap();
        assert_eq!(new_rx.recv().await.unwrap(), gone(9, 9));
    }

    #[tokio::test]
    async fn test_route_missing_rank() {
        let router = RankRouter::new();
        assert!(router.route((3, 0)).is_none());
    }

    #[tokio::test]
    async fn test_broadcast_skips_excluded() {
        let mut router = RankRouter::new();
        let (tx1, mut rx1) = mpsc::channel(10);
        let (tx2, mut rx2) = mpsc::channel(10);
        let (tx3, mut rx3) = mpsc::channel(10);
        router.register((0, 0), tx1);
        router.register((0, 1), tx2);
        router.register((0, 2), tx3);

        let sent = router.broadcast(&gone(0, 0), Some((0, 0)));
        assert_eq!(sent, 2);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_does_not_wait_on_full_queue() {
        let mut router = RankRouter::new();
        let (tx, _rx) = mpsc::channel(1);
        router.register((0, 1), tx);

        assert_eq!(router.broadcast(&gone(0, 0), None), 1);
        assert_eq!(router.broadcast(&gone(0, 0), None), 0);
    }

    #[tokio::test]
    async fn test_relay_stats() {
        let mut router = RankRouter::new();
        for _ in 0..5 {
            router.record_relay(100);
        }
        router.record_error();
        assert_eq!(router.stats().messages_relayed, 5);
        assert_eq!(router.stats().bytes_relayed, 500);
        assert_eq!(router.stats().relay_errors, 1);
    }
}
