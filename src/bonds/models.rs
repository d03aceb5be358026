//! Bond models: canonical pairs, bond state machine, bond rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FieldError, FieldResult};
use crate::nodes::{NodeId, NodeState};

// ============================================================================
// Canonical pair
// ============================================================================

/// Unordered pair of distinct nodes, always stored smaller-id-first.
///
/// `BondPair::new(a, b) == BondPair::new(b, a)`, which is what guarantees
/// at most one bond row per pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BondPair {
    low: NodeId,
    high: NodeId,
}

impl BondPair {
    pub fn new(a: NodeId, b: NodeId) -> FieldResult<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Ok(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Ok(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => Err(FieldError::SelfReference(a.to_string())),
        }
    }

    pub fn low(&self) -> &NodeId {
        &self.low
    }

    pub fn high(&self) -> &NodeId {
        &self.high
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        &self.low == id || &self.high == id
    }

    /// The other endpoint, or `None` if `id` is not part of this pair.
    pub fn peer_of(&self, id: &NodeId) -> Option<&NodeId> {
        if &self.low == id {
            Some(&self.high)
        } else if &self.high == id {
            Some(&self.low)
        } else {
            None
        }
    }
}

impl fmt::Display for BondPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.low, self.high)
    }
}

// ============================================================================
// State machine
// ============================================================================

/// Bond state: PROPOSED → BOUND → ACTIVE ⇄ INACTIVE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondState {
    Proposed,
    Bound,
    Active,
    Inactive,
}

impl BondState {
    pub fn can_transition_to(self, next: BondState) -> bool {
        matches!(
            (self, next),
            (Self::Proposed, Self::Bound)
                | (Self::Bound, Self::Active)
                | (Self::Active, Self::Inactive)
                | (Self::Inactive, Self::Active)
        )
    }
}

impl fmt::Display for BondState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proposed => write!(f, "PROPOSED"),
            Self::Bound => write!(f, "BOUND"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Inactive => write!(f, "INACTIVE"),
        }
    }
}

// ============================================================================
// Bond row
// ============================================================================

/// A bond row. Never deleted; dissolution only flips the state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondRecord {
    pub pair: BondPair,
    pub state: BondState,
    pub initiator: NodeId,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl BondRecord {
    /// A freshly proposed bond.
    pub fn proposed(pair: BondPair, initiator: NodeId, now: DateTime<Utc>) -> Self {
        Self {
            pair,
            state: BondState::Proposed,
            initiator,
            created_at: now,
            activated_at: None,
            deactivated_at: None,
        }
    }

    /// A bond that passed PROPOSED and BOUND within the same write.
    pub fn formed(pair: BondPair, initiator: NodeId, now: DateTime<Utc>) -> Self {
        Self {
            state: BondState::Active,
            activated_at: Some(now),
            ..Self::proposed(pair, initiator, now)
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == BondState::Active
    }

    /// Move to `next`, stamping the matching timestamp.
    pub fn transition(&mut self, next: BondState, at: DateTime<Utc>) -> FieldResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(FieldError::Conflict(format!(
                "bond {} cannot move from {} to {}",
                self.pair, self.state, next
            )));
        }
        self.state = next;
        match next {
            BondState::Active => {
                self.activated_at = Some(at);
                self.deactivated_at = None;
            }
            BondState::Inactive => self.deactivated_at = Some(at),
            BondState::Proposed | BondState::Bound => {}
        }
        Ok(())
    }
}

/// Result of a successful `form_bond`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondOutcome {
    pub bond: BondRecord,
    /// True when an INACTIVE row was brought back rather than inserted.
    pub reactivated: bool,
    pub initiator_state: NodeState,
    pub peer_state: NodeState,
}

/// A direct neighbour over an ACTIVE bond.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    pub id: NodeId,
    pub state: NodeState,
    pub bond_since: Option<DateTime<Utc>>,
}
