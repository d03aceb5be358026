//! Adjacency snapshot: node id → sorted set of at most [`MAX_BONDS`] peers.

use std::collections::BTreeMap;
use tracing::warn;

use crate::bonds::BondPair;
use crate::nodes::{NodeId, MAX_BONDS};

/// Sorted, capacity-bounded set of peer ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSet {
    peers: Vec<NodeId>,
}

impl PeerSet {
    /// Insert `id`, keeping order. Returns false if present or full.
    pub fn insert(&mut self, id: NodeId) -> bool {
        match self.peers.binary_search(&id) {
            Ok(_) => false,
            Err(_) if self.peers.len() >= MAX_BONDS => false,
            Err(pos) => {
                self.peers.insert(pos, id);
                true
            }
        }
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.peers.binary_search(id).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.peers.iter()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Read-only view of the ACTIVE bond graph.
///
/// Built once per traversal from a single store snapshot, so a traversal
/// never observes a bond appearing or vanishing halfway through.
#[derive(Debug, Clone, Default)]
pub struct Adjacency {
    peers: BTreeMap<NodeId, PeerSet>,
    edge_count: usize,
}

impl Adjacency {
    pub fn from_pairs(pairs: impl IntoIterator<Item = BondPair>) -> Self {
        let mut adj = Self::default();
        for pair in pairs {
            adj.add(&pair);
        }
        adj
    }

    fn add(&mut self, pair: &BondPair) {
        let (low, high) = (pair.low(), pair.high());
        let fits = |id: &NodeId, peers: &BTreeMap<NodeId, PeerSet>| {
            peers.get(id).map_or(0, PeerSet::len) < MAX_BONDS
        };
        if !fits(low, &self.peers) || !fits(high, &self.peers) {
            warn!(pair = %pair, "Skipping bond beyond degree cap in snapshot");
            return;
        }
        let inserted = self
            .peers
            .entry(low.clone())
            .or_default()
            .insert(high.clone());
        self.peers
            .entry(high.clone())
            .or_default()
            .insert(low.clone());
        if inserted {
            self.edge_count += 1;
        }
    }

    /// Neighbours of `id` in ascending id order.
    pub fn neighbours<'a>(&'a self, id: &NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.peers.get(id).into_iter().flat_map(PeerSet::iter)
    }

    pub fn degree(&self, id: &NodeId) -> usize {
        self.peers.get(id).map_or(0, PeerSet::len)
    }

    pub fn are_bonded(&self, a: &NodeId, b: &NodeId) -> bool {
        self.peers.get(a).is_some_and(|p| p.contains(b))
    }

    pub fn node_count(&self) -> usize {
        self.peers.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }
}
