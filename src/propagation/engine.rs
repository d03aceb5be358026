//! Three-phase propagation.
//!
//! 1. **Acknowledgement**: on a join, a fixed amount goes to the origin's
//!    introducer (or to the redirect pool if the introducer is not eligible).
//! 2. **Hop-weighted propagation**: BFS over ACTIVE bonds up to the horizon;
//!    each newly discovered node at hop `h` earns `R / decay_base^h`,
//!    truncated and capped at what is still unallocated.
//! 3. **Absorption**: the remainder is split across the pools.
//!
//! [`distribute`] is pure; [`PropagationEngine`] gathers its inputs from the
//! store and persists executions through the [`Ledger`].

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::absorption::absorb;
use super::config::PropagationConfig;
use super::models::*;
use crate::error::{FieldError, FieldResult};
use crate::ledger::{Account, EventKind, Ledger, LedgerEvent};
use crate::nodes::{ActivityKind, NodeId, NodeRegistry};
use crate::quantity::Quantity;
use crate::store::FieldStore;
use crate::traversal::{reachable_from, Adjacency, Reach};

// ============================================================================
// Pure distribution
// ============================================================================

/// Everything [`distribute`] needs to know about the field.
#[derive(Debug, Clone)]
pub struct FieldSnapshot {
    /// Reach from the origin, bounded by the horizon.
    pub reach: Reach,
    /// Origin's introducer, if any.
    pub introducer: Option<NodeId>,
    /// Nodes allowed to receive a share directly.
    pub eligible: HashSet<NodeId>,
}

/// Compute the distribution of `quantity` from `origin`.
///
/// The allocations always sum to `quantity` exactly.
pub fn distribute(
    origin: &NodeId,
    quantity: Quantity,
    kind: PropagationKind,
    snapshot: &FieldSnapshot,
    config: &PropagationConfig,
    now: DateTime<Utc>,
) -> FieldResult<Distribution> {
    if !quantity.is_positive() {
        return Err(FieldError::InvalidQuantity(format!(
            "propagated quantity must be positive, got {quantity}"
        )));
    }

    let redirect = Recipient::Pool(config.redirect_pool().to_string());
    let recipient_for = |id: &NodeId| {
        if snapshot.eligible.contains(id) {
            Recipient::Node(id.clone())
        } else {
            redirect.clone()
        }
    };
    let mut allocations = Vec::new();

    // Phase 1
    let mut remainder = quantity;
    if kind == PropagationKind::Join {
        if let Some(introducer) = &snapshot.introducer {
            let ack = config.acknowledgement.min(quantity);
            if ack.is_positive() {
                let recipient = recipient_for(introducer);
                let reason = if recipient.is_pool() {
                    format!("Introducer {introducer} inactive, acknowledgement redirected")
                } else {
                    format!("Acknowledgement for introducing {origin}")
                };
                allocations.push(Allocation {
                    recipient,
                    quantity: ack,
                    phase: Phase::Acknowledgement,
                    hop: Some(0),
                    weight: 1.0,
                    reason,
                });
                remainder -= ack;
            }
        }
    }
    debug!(origin = %origin, %remainder, "Acknowledgement phase done");

    // Phase 2
    let base = remainder;
    let mut unallocated = remainder;
    for node in snapshot.reach.peers() {
        if node.hop > config.horizon {
            continue;
        }
        let share = base.div_pow(config.decay_base, node.hop).min(unallocated);
        if share.is_zero() {
            continue;
        }
        let recipient = recipient_for(&node.id);
        let reason = if recipient.is_pool() {
            format!("Inactive node {} at hop {}, share redirected", node.id, node.hop)
        } else {
            format!("Propagation at hop {}", node.hop)
        };
        allocations.push(Allocation {
            recipient,
            quantity: share,
            phase: Phase::Propagation,
            hop: Some(node.hop),
            weight: node.weight,
            reason,
        });
        unallocated -= share;
    }
    debug!(
        origin = %origin,
        reached = snapshot.reach.peers().count(),
        %unallocated,
        "Hop propagation phase done"
    );

    // Phase 3
    let allocated: Quantity = allocations.iter().map(|a| a.quantity).sum();
    allocations.extend(absorb(quantity - allocated, &config.pools));

    let distribution = Distribution {
        origin: origin.clone(),
        kind,
        input: quantity,
        allocations,
        computed_at: now,
    };
    if !distribution.is_exact() {
        return Err(FieldError::InvariantViolation {
            total_in: quantity,
            total_out: distribution.total(),
            balance: quantity - distribution.total(),
        });
    }
    debug!(
        origin = %origin,
        allocations = distribution.allocations.len(),
        absorbed = %distribution.in_phase(Phase::Absorption),
        "Absorption phase done"
    );
    Ok(distribution)
}

/// Ledger events for an executed distribution: one IN for the input, then
/// one ROUTE or POOL per allocation, all sharing `reference`.
pub fn ledger_events(
    distribution: &Distribution,
    reference: Uuid,
    now: DateTime<Utc>,
) -> Vec<LedgerEvent> {
    let origin = Account::Node(distribution.origin.clone());
    let inflow = LedgerEvent::new(EventKind::In, distribution.input, now)
        .with_destination(origin.clone())
        .with_reference(reference)
        .with_meta("propagation", distribution.kind.to_string());

    std::iter::once(inflow)
        .chain(distribution.allocations.iter().map(|a| {
            let kind = if a.recipient.is_pool() {
                EventKind::Pool
            } else {
                EventKind::Route
            };
            let mut event = LedgerEvent::new(kind, a.quantity, now)
                .with_source(origin.clone())
                .with_destination(Account::from(&a.recipient))
                .with_reference(reference)
                .with_meta("phase", a.phase.to_string())
                .with_meta("reason", a.reason.clone());
            if let Some(hop) = a.hop {
                event = event.with_hop(hop);
            }
            event
        }))
        .collect()
}

// ============================================================================
// Engine
// ============================================================================

/// Propagation engine: the only component that mints ledger events from a
/// bare input quantity.
#[derive(Clone)]
pub struct PropagationEngine {
    store: Arc<dyn FieldStore>,
    registry: NodeRegistry,
    ledger: Ledger,
    config: PropagationConfig,
}

impl PropagationEngine {
    pub fn new(
        store: Arc<dyn FieldStore>,
        registry: NodeRegistry,
        ledger: Ledger,
        config: PropagationConfig,
    ) -> Self {
        Self {
            store,
            registry,
            ledger,
            config,
        }
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Gather reach, introducer and eligibility for `origin`.
    pub async fn snapshot(
        &self,
        origin: &NodeId,
        kind: PropagationKind,
        now: DateTime<Utc>,
    ) -> FieldResult<FieldSnapshot> {
        let node = match self.registry.get(origin).await? {
            Some(node) if node.is_active() => node,
            _ => return Err(FieldError::OriginNotFound(origin.to_string())),
        };
        let adj = Adjacency::from_pairs(self.store.list_active_pairs().await?);
        let reach = reachable_from(&adj, origin, self.config.horizon, self.config.decay_base);

        let introducer = match kind {
            PropagationKind::Join => node.introducer,
            PropagationKind::Flow => None,
        };

        let mut eligible = HashSet::new();
        let candidates = introducer
            .iter()
            .chain(reach.peers().map(|n| &n.id));
        for id in candidates {
            if self.is_eligible(id, now).await? {
                eligible.insert(id.clone());
            }
        }

        Ok(FieldSnapshot {
            reach,
            introducer,
            eligible,
        })
    }

    async fn is_eligible(&self, id: &NodeId, now: DateTime<Utc>) -> FieldResult<bool> {
        match self.registry.get(id).await? {
            Some(node) if node.is_active() => {
                let score = self.registry.activity_score(id, now).await?;
                Ok(score >= self.config.min_activity_score)
            }
            _ => Ok(false),
        }
    }

    /// Compute a distribution without side effects.
    pub async fn preview(
        &self,
        origin: &NodeId,
        quantity: Quantity,
        kind: PropagationKind,
        now: DateTime<Utc>,
    ) -> FieldResult<Distribution> {
        let snapshot = self.snapshot(origin, kind, now).await?;
        distribute(origin, quantity, kind, &snapshot, &self.config, now)
    }

    /// Compute a distribution and commit its ledger events atomically.
    pub async fn execute(
        &self,
        origin: &NodeId,
        quantity: Quantity,
        kind: PropagationKind,
        now: DateTime<Utc>,
    ) -> FieldResult<ExecutedPropagation> {
        let distribution = self.preview(origin, quantity, kind, now).await?;
        let reference = Uuid::new_v4();
        let events = ledger_events(&distribution, reference, now);
        let event_ids = self.ledger.record_batch(&events).await?;

        // Events are committed; follow-up bookkeeping must not fail the call.
        if kind == PropagationKind::Join {
            if let Err(e) = self.registry.mark_acknowledged(origin).await {
                warn!(origin = %origin, error = %e, "Failed to mark node acknowledged");
            }
        }
        if let Err(e) = self
            .registry
            .record_activity(origin, ActivityKind::Propagation, now)
            .await
        {
            warn!(origin = %origin, error = %e, "Failed to record propagation activity");
        }

        info!(
            origin = %origin,
            %kind,
            quantity = %quantity,
            %reference,
            events = event_ids.len(),
            max_hop = distribution.max_hop(),
            "Propagation executed"
        );

        Ok(ExecutedPropagation {
            distribution,
            reference,
            event_ids,
        })
    }
}
