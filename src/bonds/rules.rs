//! Bond formation and dissolution rules.
//!
//! A store runs a bond write as one transaction:
//! 1. collect a [`BondView`] of the pair and both endpoints,
//! 2. ask a [`BondPlanner`] for a [`BondWrite`] (or a rejection),
//! 3. apply it with [`apply_write`].
//!
//! Steps 1–3 happen under the same lock (or database transaction), so
//! the degree cap and cooldown cannot be raced by a concurrent formation.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use super::models::{BondPair, BondRecord, BondState};
use crate::error::{FieldError, FieldResult};
use crate::nodes::{NodeId, NodeRecord, MAX_BONDS};

// ============================================================================
// Transaction view
// ============================================================================

/// Everything a planner may read, captured inside the write transaction.
#[derive(Debug, Clone)]
pub struct BondView {
    pub pair: BondPair,
    /// Existing row for the pair, any state.
    pub existing: Option<BondRecord>,
    /// Endpoint records that exist (missing endpoints are absent).
    pub nodes: HashMap<NodeId, NodeRecord>,
    /// Most recent `created_at` over all bond rows touching each endpoint.
    pub last_created: HashMap<NodeId, DateTime<Utc>>,
}

impl BondView {
    pub fn node(&self, id: &NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    fn active_node(&self, id: &NodeId) -> FieldResult<&NodeRecord> {
        self.node(id)
            .filter(|n| n.is_active())
            .ok_or_else(|| FieldError::node_not_found(id))
    }
}

/// Write decided by a planner.
#[derive(Debug, Clone)]
pub enum BondWrite {
    /// Insert a new ACTIVE row.
    Insert(BondRecord),
    /// Bring an existing non-active row to ACTIVE.
    Activate { at: DateTime<Utc> },
    /// Move the ACTIVE row to INACTIVE.
    Deactivate { at: DateTime<Utc> },
}

/// What a store committed for a bond write.
#[derive(Debug, Clone)]
pub struct BondCommit {
    pub bond: BondRecord,
    /// True when an existing row was brought back to ACTIVE.
    pub reactivated: bool,
    /// Endpoint records after the write.
    pub low: NodeRecord,
    pub high: NodeRecord,
}

impl BondCommit {
    /// `(node, other)` endpoint records, oriented on `id`.
    pub fn oriented(&self, id: &NodeId) -> (&NodeRecord, &NodeRecord) {
        if &self.low.id == id {
            (&self.low, &self.high)
        } else {
            (&self.high, &self.low)
        }
    }
}

/// Decides the write for a pair given a consistent view.
pub trait BondPlanner: Send + Sync {
    fn plan(&self, view: &BondView) -> FieldResult<BondWrite>;
}

// ============================================================================
// Planners
// ============================================================================

/// Tunables for bond formation.
#[derive(Debug, Clone)]
pub struct BondRules {
    /// Minimum time between two bond formations by the same initiator.
    pub cooldown: Duration,
    /// Whether reactivating an INACTIVE pair is also subject to the cooldown.
    pub cooldown_on_reactivation: bool,
}

impl Default for BondRules {
    fn default() -> Self {
        Self {
            cooldown: Duration::hours(24),
            cooldown_on_reactivation: false,
        }
    }
}

/// Planner for `form_bond(initiator, peer)`.
#[derive(Debug, Clone)]
pub struct FormationPlan {
    pub initiator: NodeId,
    pub peer: NodeId,
    pub now: DateTime<Utc>,
    pub rules: BondRules,
}

impl FormationPlan {
    fn check_cooldown(&self, view: &BondView) -> FieldResult<()> {
        if let Some(last) = view.last_created.get(&self.initiator) {
            let elapsed = self.now - *last;
            if elapsed < self.rules.cooldown {
                return Err(FieldError::Cooldown {
                    node: self.initiator.to_string(),
                    remaining: self.rules.cooldown - elapsed,
                });
            }
        }
        Ok(())
    }
}

impl BondPlanner for FormationPlan {
    fn plan(&self, view: &BondView) -> FieldResult<BondWrite> {
        let initiator = view.active_node(&self.initiator)?;
        let peer = view.active_node(&self.peer)?;

        if let Some(existing) = &view.existing {
            if existing.is_active() {
                return Err(FieldError::AlreadyActive(
                    view.pair.low().to_string(),
                    view.pair.high().to_string(),
                ));
            }
        }

        for node in [initiator, peer] {
            if node.is_saturated() {
                return Err(FieldError::CapacityExceeded {
                    node: node.id.to_string(),
                    max: MAX_BONDS,
                });
            }
        }

        if view.existing.is_some() {
            if self.rules.cooldown_on_reactivation {
                self.check_cooldown(view)?;
            }
            return Ok(BondWrite::Activate { at: self.now });
        }

        self.check_cooldown(view)?;
        Ok(BondWrite::Insert(BondRecord::formed(
            view.pair.clone(),
            self.initiator.clone(),
            self.now,
        )))
    }
}

/// Planner for `dissolve_bond(a, b)`.
#[derive(Debug, Clone)]
pub struct DissolutionPlan {
    pub now: DateTime<Utc>,
}

impl BondPlanner for DissolutionPlan {
    fn plan(&self, view: &BondView) -> FieldResult<BondWrite> {
        match &view.existing {
            Some(bond) if bond.is_active() => Ok(BondWrite::Deactivate { at: self.now }),
            _ => Err(FieldError::NotFound(format!(
                "active bond between '{}' and '{}'",
                view.pair.low(),
                view.pair.high()
            ))),
        }
    }
}

// ============================================================================
// Apply
// ============================================================================

/// Apply a planned write to the pair row and both endpoint records.
///
/// Returns the resulting row. Counts and lifecycle states of the endpoints
/// are updated in place; the degree cap is re-asserted here so no store can
/// commit a sixth ACTIVE bond.
pub fn apply_write(
    write: BondWrite,
    existing: Option<BondRecord>,
    low: &mut NodeRecord,
    high: &mut NodeRecord,
) -> FieldResult<BondRecord> {
    let bond = match write {
        BondWrite::Insert(bond) => {
            if existing.is_some() {
                return Err(FieldError::Conflict(format!(
                    "bond row for {} already exists",
                    bond.pair
                )));
            }
            increment_both(low, high)?;
            bond
        }
        BondWrite::Activate { at } => {
            let mut bond = existing.ok_or_else(|| {
                FieldError::Conflict(format!("no row to activate for {} <-> {}", low.id, high.id))
            })?;
            if bond.state == BondState::Proposed {
                bond.transition(BondState::Bound, at)?;
            }
            bond.transition(BondState::Active, at)?;
            increment_both(low, high)?;
            bond
        }
        BondWrite::Deactivate { at } => {
            let mut bond = existing.ok_or_else(|| {
                FieldError::Conflict(format!("no row to deactivate for {} <-> {}", low.id, high.id))
            })?;
            bond.transition(BondState::Inactive, at)?;
            low.decrement_bonds();
            high.decrement_bonds();
            bond
        }
    };
    Ok(bond)
}

fn increment_both(low: &mut NodeRecord, high: &mut NodeRecord) -> FieldResult<()> {
    for node in [&*low, &*high] {
        if node.is_saturated() {
            return Err(FieldError::CapacityExceeded {
                node: node.id.to_string(),
                max: MAX_BONDS,
            });
        }
    }
    low.increment_bonds();
    high.increment_bonds();
    Ok(())
}
