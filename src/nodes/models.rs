//! Node registry models: identities, derived lifecycle, activity log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of ACTIVE bonds a node may hold.
pub const MAX_BONDS: usize = 5;

// ============================================================================
// Identity
// ============================================================================

/// Opaque participant identifier. Ordered so bond pairs can be canonicalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Derived lifecycle state of a node.
///
/// Never set directly: always recomputed from the active bond count
/// (and the acknowledgement flag while the node has no bonds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Instantiated,
    Acknowledged,
    Connected,
    Propagating,
    Saturated,
}

impl NodeState {
    /// Compute the state for a given active bond count.
    pub fn derive(bond_count: usize, acknowledged: bool) -> Self {
        match bond_count {
            0 if acknowledged => Self::Acknowledged,
            0 => Self::Instantiated,
            1..=2 => Self::Connected,
            3..=4 => Self::Propagating,
            _ => Self::Saturated,
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instantiated => write!(f, "INSTANTIATED"),
            Self::Acknowledged => write!(f, "ACKNOWLEDGED"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::Propagating => write!(f, "PROPAGATING"),
            Self::Saturated => write!(f, "SATURATED"),
        }
    }
}

/// Administrative status. Suspended nodes are treated as missing by
/// bond formation and propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Active,
    Suspended,
}

// ============================================================================
// Node record
// ============================================================================

/// A registered participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub display_name: String,
    /// Node that introduced this one; receives the join acknowledgement.
    pub introducer: Option<NodeId>,
    pub status: NodeStatus,
    /// Set once a join propagation has been executed for this node.
    pub acknowledged: bool,
    /// Number of ACTIVE bonds. Mutated only by bond writes.
    pub bond_count: usize,
    pub state: NodeState,
    pub created_at: DateTime<Utc>,
}

impl NodeRecord {
    pub fn new(
        id: NodeId,
        display_name: impl Into<String>,
        introducer: Option<NodeId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            introducer,
            status: NodeStatus::Active,
            acknowledged: false,
            bond_count: 0,
            state: NodeState::Instantiated,
            created_at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }

    pub fn is_saturated(&self) -> bool {
        self.bond_count >= MAX_BONDS
    }

    /// Re-derive `state` after any mutation of `bond_count` or `acknowledged`.
    pub fn recompute_state(&mut self) {
        self.state = NodeState::derive(self.bond_count, self.acknowledged);
    }

    pub fn increment_bonds(&mut self) {
        self.bond_count += 1;
        self.recompute_state();
    }

    /// Decrement, floored at zero.
    pub fn decrement_bonds(&mut self) {
        self.bond_count = self.bond_count.saturating_sub(1);
        self.recompute_state();
    }
}

// ============================================================================
// Activity
// ============================================================================

/// Kind of recorded activity. Every kind counts equally toward the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Bond,
    Transaction,
    Engagement,
    Verification,
    Propagation,
}

/// One entry in a node's activity log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub node_id: NodeId,
    pub kind: ActivityKind,
    pub recorded_at: DateTime<Utc>,
}
