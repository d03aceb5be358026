//! Per-node field statistics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::bfs::Reach;
use crate::nodes::{NodeId, NodeRecord, NodeState, MAX_BONDS};

/// Hop radius used for node statistics.
pub const STATS_HOPS: u32 = 5;

/// Coarse label for how active a node's surrounding field is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldHealth {
    New,
    Emerging,
    Growing,
    Healthy,
    Excellent,
}

impl FieldHealth {
    /// Classify by the share of reached peers with a non-zero activity score.
    pub fn assess(active: usize, reached: usize) -> Self {
        if reached == 0 {
            return Self::New;
        }
        let ratio = active as f64 / reached as f64;
        if ratio >= 0.7 {
            Self::Excellent
        } else if ratio >= 0.4 {
            Self::Healthy
        } else if ratio >= 0.2 {
            Self::Growing
        } else {
            Self::Emerging
        }
    }
}

impl fmt::Display for FieldHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Emerging => write!(f, "emerging"),
            Self::Growing => write!(f, "growing"),
            Self::Healthy => write!(f, "healthy"),
            Self::Excellent => write!(f, "excellent"),
        }
    }
}

/// Summary of a node and its field within [`STATS_HOPS`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStats {
    pub node: NodeId,
    pub state: NodeState,
    pub bond_count: usize,
    pub max_bonds: usize,
    /// Bond count as a percentage of [`MAX_BONDS`].
    pub capacity_pct: f64,
    pub direct_peers: usize,
    /// Reached nodes, origin included.
    pub reach: usize,
    pub hop_distribution: BTreeMap<u32, usize>,
    pub activity_score: f64,
    pub field_health: FieldHealth,
}

impl NodeStats {
    /// Build from a reach of [`STATS_HOPS`] and the activity scores of
    /// its peers.
    pub fn build(
        node: &NodeRecord,
        reach: &Reach,
        activity_score: f64,
        peer_scores: &BTreeMap<NodeId, f64>,
    ) -> Self {
        let peers: Vec<_> = reach.peers().collect();
        let active = peers
            .iter()
            .filter(|p| peer_scores.get(&p.id).copied().unwrap_or(0.0) > 0.0)
            .count();

        Self {
            node: node.id.clone(),
            state: node.state,
            bond_count: node.bond_count,
            max_bonds: MAX_BONDS,
            capacity_pct: node.bond_count as f64 / MAX_BONDS as f64 * 100.0,
            direct_peers: peers.iter().filter(|p| p.hop == 1).count(),
            reach: reach.nodes.len(),
            hop_distribution: reach.hop_distribution(),
            activity_score,
            field_health: FieldHealth::assess(active, peers.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bonds::BondPair;
    use crate::traversal::{reachable_from, Adjacency};
    use chrono::Utc;

    #[test]
    fn test_health_thresholds() {
        assert_eq!(FieldHealth::assess(0, 0), FieldHealth::New);
        assert_eq!(FieldHealth::assess(0, 4), FieldHealth::Emerging);
        assert_eq!(FieldHealth::assess(1, 5), FieldHealth::Growing);
        assert_eq!(FieldHealth::assess(2, 5), FieldHealth::Healthy);
        assert_eq!(FieldHealth::assess(7, 10), FieldHealth::Excellent);
    }

    #[test]
    fn test_build_stats() {
        let adj = Adjacency::from_pairs([
            BondPair::new("o".into(), "a".into()).unwrap(),
            BondPair::new("a".into(), "b".into()).unwrap(),
        ]);
        let reach = reachable_from(&adj, &"o".into(), STATS_HOPS, 2);
        let mut node = NodeRecord::new("o".into(), "O", None, Utc::now());
        node.increment_bonds();

        let scores = BTreeMap::from([(NodeId::from("a"), 10.0)]);
        let stats = NodeStats::build(&node, &reach, 3.3, &scores);

        assert_eq!(stats.capacity_pct, 20.0);
        assert_eq!(stats.direct_peers, 1);
        assert_eq!(stats.reach, 3);
        assert_eq!(stats.hop_distribution.get(&2), Some(&1));
        assert_eq!(stats.field_health, FieldHealth::Healthy);
    }
}
