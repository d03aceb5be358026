//! Propagation models: event kinds, allocations and distribution results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ledger::Account;
use crate::nodes::NodeId;
use crate::quantity::Quantity;

/// What triggered a propagation. Only joins pay an acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PropagationKind {
    Join,
    #[default]
    Flow,
}

impl fmt::Display for PropagationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join => write!(f, "join"),
            Self::Flow => write!(f, "flow"),
        }
    }
}

impl FromStr for PropagationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "join" => Ok(Self::Join),
            "flow" => Ok(Self::Flow),
            _ => Err(format!("Unknown propagation kind: {}", s)),
        }
    }
}

/// Phase that produced an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Acknowledgement,
    Propagation,
    Absorption,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acknowledgement => write!(f, "acknowledgement"),
            Self::Propagation => write!(f, "propagation"),
            Self::Absorption => write!(f, "absorption"),
        }
    }
}

/// Who receives an allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Node(NodeId),
    Pool(String),
}

impl Recipient {
    pub fn is_pool(&self) -> bool {
        matches!(self, Self::Pool(_))
    }
}

impl From<&Recipient> for Account {
    fn from(r: &Recipient) -> Self {
        match r {
            Recipient::Node(id) => Account::Node(id.clone()),
            Recipient::Pool(name) => Account::Pool(name.clone()),
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => write!(f, "{id}"),
            Self::Pool(name) => write!(f, "pool:{name}"),
        }
    }
}

/// One line of a distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub recipient: Recipient,
    pub quantity: Quantity,
    pub phase: Phase,
    /// Hop of the node that earned the share; `None` for absorption.
    pub hop: Option<u32>,
    pub weight: f64,
    pub reason: String,
}

/// Complete, exactly conserving breakdown of an input quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distribution {
    pub origin: NodeId,
    pub kind: PropagationKind,
    pub input: Quantity,
    /// In phase order; within phase 2 in BFS discovery order.
    pub allocations: Vec<Allocation>,
    pub computed_at: DateTime<Utc>,
}

impl Distribution {
    pub fn total(&self) -> Quantity {
        self.allocations.iter().map(|a| a.quantity).sum()
    }

    /// True when the allocations add up to the input to the smallest unit.
    pub fn is_exact(&self) -> bool {
        self.total() == self.input
    }

    pub fn max_hop(&self) -> u32 {
        self.allocations
            .iter()
            .filter_map(|a| a.hop)
            .max()
            .unwrap_or(0)
    }

    /// Quantity allocated to nodes.
    pub fn to_nodes(&self) -> Quantity {
        self.allocations
            .iter()
            .filter(|a| !a.recipient.is_pool())
            .map(|a| a.quantity)
            .sum()
    }

    /// Quantity allocated to `phase`.
    pub fn in_phase(&self, phase: Phase) -> Quantity {
        self.allocations
            .iter()
            .filter(|a| a.phase == phase)
            .map(|a| a.quantity)
            .sum()
    }

    /// Total received by a recipient across all phases.
    pub fn received_by(&self, recipient: &Recipient) -> Quantity {
        self.allocations
            .iter()
            .filter(|a| &a.recipient == recipient)
            .map(|a| a.quantity)
            .sum()
    }
}

/// A distribution that has been committed to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedPropagation {
    pub distribution: Distribution,
    /// Shared by every event of this execution.
    pub reference: Uuid,
    pub event_ids: Vec<Uuid>,
}
