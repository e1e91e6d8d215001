//! Peer table (C4): in-memory directory of known peers, capped by
//! `max_neighbors`. Grounded in `original_source/modules/ez_p2p/peer_manager.py`
//! (`PeerManager`/`PeerInfo`), stored with the teacher's `HashMap`-plus-accessor
//! style (`montana/src/net/peer.rs`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::envelope::Network;

/// `{node_id, role, network_id, latest_index, address}` (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub node_id: String,
    pub role: Network,
    pub network_id: String,
    pub latest_index: u64,
    pub address: String,
}

/// Table of known peers, keyed by `node_id`. No eviction policy at capacity
/// (§4.4 Open Question (a), decided in DESIGN.md: refuse silently, never evict).
pub struct PeerTable {
    max_neighbors: usize,
    peers: HashMap<String, PeerEntry>,
}

impl PeerTable {
    pub fn new(max_neighbors: usize) -> Self {
        Self {
            max_neighbors,
            peers: HashMap::new(),
        }
    }

    /// Inserts or updates `peer`. Returns `false` (without mutating the
    /// table) when at capacity, matching `PeerManager.add_peer` exactly —
    /// including refusing an update to an already-known peer once the table
    /// is full, since the source checks capacity before the key lookup.
    pub fn add(&mut self, peer: PeerEntry) -> bool {
        if self.peers.len() >= self.max_neighbors {
            return false;
        }
        self.peers.insert(peer.node_id.clone(), peer);
        true
    }

    pub fn remove(&mut self, node_id: &str) {
        self.peers.remove(node_id);
    }

    pub fn list(&self) -> Vec<PeerEntry> {
        self.peers.values().cloned().collect()
    }

    pub fn select_by_role(&self, role: Network) -> Vec<PeerEntry> {
        self.peers.values().filter(|p| p.role == role).cloned().collect()
    }

    pub fn get(&self, node_id: &str) -> Option<&PeerEntry> {
        self.peers.get(node_id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
