//! Bond graph operations: formation, dissolution and neighbour lookup.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::models::{BondOutcome, BondPair, BondRecord, Peer};
use super::rules::{BondRules, DissolutionPlan, FormationPlan};
use crate::error::FieldResult;
use crate::nodes::{ActivityKind, NodeId, NodeRegistry};
use crate::store::FieldStore;

/// Degree-bounded bond graph backed by a [`FieldStore`].
#[derive(Clone)]
pub struct BondGraph {
    store: Arc<dyn FieldStore>,
    registry: NodeRegistry,
    rules: BondRules,
}

impl BondGraph {
    pub fn new(store: Arc<dyn FieldStore>, registry: NodeRegistry, rules: BondRules) -> Self {
        Self {
            store,
            registry,
            rules,
        }
    }

    pub fn rules(&self) -> &BondRules {
        &self.rules
    }

    /// Form (or reactivate) the bond between `initiator` and `peer`.
    pub async fn form_bond(
        &self,
        initiator: &NodeId,
        peer: &NodeId,
        now: DateTime<Utc>,
    ) -> FieldResult<BondOutcome> {
        let pair = BondPair::new(initiator.clone(), peer.clone())?;
        let plan = FormationPlan {
            initiator: initiator.clone(),
            peer: peer.clone(),
            now,
            rules: self.rules.clone(),
        };

        let commit = match self.store.write_bond(&pair, &plan).await {
            Ok(commit) => commit,
            Err(e) => {
                warn!(%initiator, %peer, error = %e, "Bond formation rejected");
                return Err(e);
            }
        };

        for id in [initiator, peer] {
            if let Err(e) = self
                .registry
                .record_activity(id, ActivityKind::Bond, now)
                .await
            {
                warn!(node = %id, error = %e, "Failed to record bond activity");
            }
        }

        let (initiator_rec, peer_rec) = commit.oriented(initiator);
        info!(
            pair = %pair,
            reactivated = commit.reactivated,
            initiator_bonds = initiator_rec.bond_count,
            peer_bonds = peer_rec.bond_count,
            "Bond formed"
        );

        Ok(BondOutcome {
            initiator_state: initiator_rec.state,
            peer_state: peer_rec.state,
            reactivated: commit.reactivated,
            bond: commit.bond,
        })
    }

    /// Dissolve the ACTIVE bond between `a` and `b`. The row is kept.
    pub async fn dissolve_bond(
        &self,
        a: &NodeId,
        b: &NodeId,
        now: DateTime<Utc>,
    ) -> FieldResult<BondRecord> {
        let pair = BondPair::new(a.clone(), b.clone())?;
        match self.store.write_bond(&pair, &DissolutionPlan { now }).await {
            Ok(commit) => {
                info!(pair = %pair, "Bond dissolved");
                Ok(commit.bond)
            }
            Err(e) => {
                warn!(pair = %pair, error = %e, "Bond dissolution rejected");
                Err(e)
            }
        }
    }

    pub async fn get_bond(&self, a: &NodeId, b: &NodeId) -> FieldResult<Option<BondRecord>> {
        let pair = BondPair::new(a.clone(), b.clone())?;
        self.store.get_bond(&pair).await
    }

    /// Every bond row touching `id`, any state.
    pub async fn bonds_of(&self, id: &NodeId) -> FieldResult<Vec<BondRecord>> {
        self.store.list_bonds_for(id).await
    }

    /// Direct neighbours over ACTIVE bonds, ordered by id.
    pub async fn peers_of(&self, id: &NodeId) -> FieldResult<Vec<Peer>> {
        let mut peers = Vec::new();
        for bond in self.store.list_bonds_for(id).await? {
            if !bond.is_active() {
                continue;
            }
            let Some(peer_id) = bond.pair.peer_of(id) else {
                continue;
            };
            if let Some(node) = self.registry.get(peer_id).await? {
                peers.push(Peer {
                    id: node.id,
                    state: node.state,
                    bond_since: bond.activated_at,
                });
            }
        }
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(peers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;
    use crate::nodes::{NodeState, MAX_BONDS};
    use crate::store::MemoryFieldStore;
    use chrono::Duration;

    async fn graph_with(ids: &[&str], rules: BondRules) -> BondGraph {
        let store: Arc<dyn FieldStore> = Arc::new(MemoryFieldStore::new());
        let registry = NodeRegistry::new(store.clone(), 30);
        let now = Utc::now();
        for id in ids {
            registry.register((*id).into(), id, None, now).await.unwrap();
        }
        BondGraph::new(store, registry, rules)
    }

    fn no_cooldown() -> BondRules {
        BondRules {
            cooldown: Duration::zero(),
            cooldown_on_reactivation: false,
        }
    }

    #[tokio::test]
    async fn test_form_bond_reports_states() {
        let graph = graph_with(&["a", "b"], BondRules::default()).await;
        let outcome = graph
            .form_bond(&"a".into(), &"b".into(), Utc::now())
            .await
            .unwrap();
        assert!(!outcome.reactivated);
        assert_eq!(outcome.initiator_state, NodeState::Connected);
        assert_eq!(outcome.peer_state, NodeState::Connected);
        assert_eq!(outcome.bond.initiator.as_str(), "a");
    }

    #[tokio::test]
    async fn test_self_bond_rejected() {
        let graph = graph_with(&["a"], BondRules::default()).await;
        let err = graph
            .form_bond(&"a".into(), &"a".into(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, FieldError::SelfReference(_)));
    }

    #[tokio::test]
    async fn test_sixth_bond_rejected() {
        let graph = graph_with(&["hub", "p1", "p2", "p3", "p4", "p5", "p6"], no_cooldown()).await;
        let hub: NodeId = "hub".into();
        let now = Utc::now();
        for i in 1..=MAX_BONDS {
            graph
                .form_bond(&hub, &format!("p{i}").into(), now)
                .await
                .unwrap();
        }
        let err = graph
            .form_bond(&"p6".into(), &hub, now)
            .await
            .unwrap_err();
        assert!(matches!(err, FieldError::CapacityExceeded { .. }));

        let peers = graph.peers_of(&hub).await.unwrap();
        assert_eq!(peers.len(), MAX_BONDS);
        assert_eq!(peers[0].id.as_str(), "p1");
    }

    #[tokio::test]
    async fn test_dissolve_twice() {
        let graph = graph_with(&["a", "b"], no_cooldown()).await;
        let (a, b): (NodeId, NodeId) = ("a".into(), "b".into());
        let now = Utc::now();
        graph.form_bond(&a, &b, now).await.unwrap();

        let bond = graph.dissolve_bond(&b, &a, now).await.unwrap();
        assert!(!bond.is_active());

        let err = graph.dissolve_bond(&a, &b, now).await.unwrap_err();
        assert!(matches!(err, FieldError::NotFound(_)));
        assert!(graph.peers_of(&a).await.unwrap().is_empty());
        assert_eq!(graph.bonds_of(&a).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bond_records_activity() {
        let graph = graph_with(&["a", "b"], no_cooldown()).await;
        let now = Utc::now();
        graph
            .form_bond(&"a".into(), &"b".into(), now)
            .await
            .unwrap();
        let score = graph
            .registry
            .activity_score(&"b".into(), now)
            .await
            .unwrap();
        assert!(score > 0.0);
    }
}
