//! Breadth-first reachability and shortest paths over an [`Adjacency`].
//!
//! Both searches enumerate neighbours in ascending id order, so results are
//! deterministic for a given snapshot. Each node is visited once, at the hop
//! where it is first discovered.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::debug;

use super::adjacency::Adjacency;
use crate::bonds::BondPair;
use crate::nodes::NodeId;

/// A node discovered by [`reachable_from`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReachedNode {
    pub id: NodeId,
    pub hop: u32,
    /// `1 / decay_base^hop`; the origin has weight 1.0.
    pub weight: f64,
}

/// Everything within `max_hops` of `origin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reach {
    pub origin: NodeId,
    pub max_hops: u32,
    /// In discovery order: origin first, then by hop, then by id.
    pub nodes: Vec<ReachedNode>,
    /// Deduplicated ACTIVE bonds between reached nodes.
    pub edges: Vec<BondPair>,
}

impl Reach {
    pub fn hop_of(&self, id: &NodeId) -> Option<u32> {
        self.nodes.iter().find(|n| &n.id == id).map(|n| n.hop)
    }

    /// Reached nodes other than the origin.
    pub fn peers(&self) -> impl Iterator<Item = &ReachedNode> {
        self.nodes.iter().filter(|n| n.hop > 0)
    }

    /// Number of reached nodes per hop, origin included at hop 0.
    pub fn hop_distribution(&self) -> BTreeMap<u32, usize> {
        let mut dist = BTreeMap::new();
        for node in &self.nodes {
            *dist.entry(node.hop).or_insert(0) += 1;
        }
        dist
    }
}

/// Weight of a node at `hop`.
pub fn hop_weight(decay_base: u32, hop: u32) -> f64 {
    1.0 / (decay_base as f64).powi(hop as i32)
}

/// BFS from `origin` up to `max_hops`.
///
/// The origin is always returned at hop 0, even when it has no bonds.
pub fn reachable_from(adj: &Adjacency, origin: &NodeId, max_hops: u32, decay_base: u32) -> Reach {
    let mut hops: HashMap<&NodeId, u32> = HashMap::new();
    let mut nodes = vec![ReachedNode {
        id: origin.clone(),
        hop: 0,
        weight: 1.0,
    }];
    let mut edges = BTreeSet::new();
    let mut queue = VecDeque::from([(origin, 0u32)]);
    hops.insert(origin, 0);

    while let Some((current, hop)) = queue.pop_front() {
        for peer in adj.neighbours(current) {
            if !hops.contains_key(peer) {
                if hop >= max_hops {
                    continue;
                }
                hops.insert(peer, hop + 1);
                nodes.push(ReachedNode {
                    id: peer.clone(),
                    hop: hop + 1,
                    weight: hop_weight(decay_base, hop + 1),
                });
                queue.push_back((peer, hop + 1));
            }
            if let Ok(pair) = BondPair::new(current.clone(), peer.clone()) {
                edges.insert(pair);
            }
        }
    }

    debug!(
        origin = %origin,
        max_hops,
        reached = nodes.len(),
        edges = edges.len(),
        "Reach computed"
    );

    Reach {
        origin: origin.clone(),
        max_hops,
        nodes,
        edges: edges.into_iter().collect(),
    }
}

/// Outcome of [`shortest_path`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PathResult {
    Found { path: Vec<NodeId>, hops: u32 },
    NoPath,
}

/// Hop-minimal path from `from` to `to`.
pub fn shortest_path(adj: &Adjacency, from: &NodeId, to: &NodeId) -> PathResult {
    if from == to {
        return PathResult::Found {
            path: vec![from.clone()],
            hops: 0,
        };
    }

    let mut parent: HashMap<&NodeId, Option<&NodeId>> = HashMap::from([(from, None)]);
    let mut queue = VecDeque::from([from]);

    while let Some(current) = queue.pop_front() {
        for peer in adj.neighbours(current) {
            if parent.contains_key(peer) {
                continue;
            }
            parent.insert(peer, Some(current));
            if peer == to {
                let mut path = vec![peer.clone()];
                let mut cursor = current;
                path.push(cursor.clone());
                while let Some(Some(prev)) = parent.get(cursor) {
                    path.push((*prev).clone());
                    cursor = *prev;
                }
                path.reverse();
                let hops = (path.len() - 1) as u32;
                return PathResult::Found { path, hops };
            }
            queue.push_back(peer);
        }
    }

    PathResult::NoPath
}
