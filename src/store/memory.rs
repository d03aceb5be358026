//! In-memory implementation of FieldStore.
//!
//! All tables live behind a single `tokio::sync::RwLock`, so a bond write
//! or an event batch is one critical section and every read sees one
//! consistent snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::traits::FieldStore;
use crate::bonds::{
    apply_write, BondCommit, BondPair, BondPlanner, BondRecord, BondView, BondWrite,
};
use crate::error::{FieldError, FieldResult};
use crate::ledger::{EventFilter, EventKind, LedgerEvent};
use crate::nodes::{ActivityEntry, NodeId, NodeRecord, NodeStatus};
use crate::quantity::Quantity;

#[derive(Debug, Default)]
struct FieldTables {
    nodes: BTreeMap<NodeId, NodeRecord>,
    activity: Vec<ActivityEntry>,
    bonds: BTreeMap<BondPair, BondRecord>,
    events: Vec<LedgerEvent>,
    event_ids: HashSet<Uuid>,
}

impl FieldTables {
    fn node_mut(&mut self, id: &NodeId) -> FieldResult<&mut NodeRecord> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| FieldError::node_not_found(id))
    }

    fn last_bond_created(&self, id: &NodeId) -> Option<DateTime<Utc>> {
        self.bonds
            .values()
            .filter(|b| b.pair.contains(id))
            .map(|b| b.created_at)
            .max()
    }

    fn view(&self, pair: &BondPair) -> BondView {
        let mut nodes = HashMap::new();
        let mut last_created = HashMap::new();
        for id in [pair.low(), pair.high()] {
            if let Some(node) = self.nodes.get(id) {
                nodes.insert(id.clone(), node.clone());
            }
            if let Some(at) = self.last_bond_created(id) {
                last_created.insert(id.clone(), at);
            }
        }
        BondView {
            pair: pair.clone(),
            existing: self.bonds.get(pair).cloned(),
            nodes,
            last_created,
        }
    }
}

/// In-memory [`FieldStore`] for tests, fixtures and the CLI.
///
/// # Example
///
/// ```rust
/// use bondfield::nodes::NodeRecord;
/// use bondfield::store::{FieldStore, MemoryFieldStore};
///
/// # tokio_test::block_on(async {
/// let store = MemoryFieldStore::new();
/// let node = NodeRecord::new("alice".into(), "Alice", None, chrono::Utc::now());
/// store.insert_node(&node).await.unwrap();
///
/// // Ids are unique
/// assert!(store.insert_node(&node).await.is_err());
/// assert_eq!(store.list_nodes().await.unwrap().len(), 1);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryFieldStore {
    tables: RwLock<FieldTables>,
}

impl MemoryFieldStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FieldStore for MemoryFieldStore {
    async fn insert_node(&self, node: &NodeRecord) -> FieldResult<()> {
        let mut tables = self.tables.write().await;
        if tables.nodes.contains_key(&node.id) {
            return Err(FieldError::Conflict(format!(
                "node '{}' already registered",
                node.id
            )));
        }
        tables.nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }

    async fn get_node(&self, id: &NodeId) -> FieldResult<Option<NodeRecord>> {
        Ok(self.tables.read().await.nodes.get(id).cloned())
    }

    async fn list_nodes(&self) -> FieldResult<Vec<NodeRecord>> {
        Ok(self.tables.read().await.nodes.values().cloned().collect())
    }

    async fn set_node_status(&self, id: &NodeId, status: NodeStatus) -> FieldResult<()> {
        let mut tables = self.tables.write().await;
        tables.node_mut(id)?.status = status;
        Ok(())
    }

    async fn mark_acknowledged(&self, id: &NodeId) -> FieldResult<()> {
        let mut tables = self.tables.write().await;
        let node = tables.node_mut(id)?;
        node.acknowledged = true;
        node.recompute_state();
        Ok(())
    }

    async fn insert_activity(&self, entry: &ActivityEntry) -> FieldResult<()> {
        self.tables.write().await.activity.push(entry.clone());
        Ok(())
    }

    async fn count_activity_since(
        &self,
        id: &NodeId,
        since: DateTime<Utc>,
    ) -> FieldResult<usize> {
        let tables = self.tables.read().await;
        Ok(tables
            .activity
            .iter()
            .filter(|a| &a.node_id == id && a.recorded_at >= since)
            .count())
    }

    async fn get_bond(&self, pair: &BondPair) -> FieldResult<Option<BondRecord>> {
        Ok(self.tables.read().await.bonds.get(pair).cloned())
    }

    async fn list_bonds_for(&self, id: &NodeId) -> FieldResult<Vec<BondRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bonds
            .values()
            .filter(|b| b.pair.contains(id))
            .cloned()
            .collect())
    }

    async fn list_active_pairs(&self) -> FieldResult<Vec<BondPair>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bonds
            .values()
            .filter(|b| b.is_active())
            .map(|b| b.pair.clone())
            .collect())
    }

    async fn write_bond(
        &self,
        pair: &BondPair,
        planner: &dyn BondPlanner,
    ) -> FieldResult<BondCommit> {
        let mut tables = self.tables.write().await;

        let view = tables.view(pair);
        let write = planner.plan(&view)?;
        let reactivated = matches!(write, BondWrite::Activate { .. });

        let mut low = view
            .node(pair.low())
            .cloned()
            .ok_or_else(|| FieldError::node_not_found(pair.low()))?;
        let mut high = view
            .node(pair.high())
            .cloned()
            .ok_or_else(|| FieldError::node_not_found(pair.high()))?;

        // Nothing is written until every check has passed.
        let bond = apply_write(write, view.existing, &mut low, &mut high)?;

        debug!(pair = %pair, state = %bond.state, "Bond row written");
        tables.bonds.insert(pair.clone(), bond.clone());
        tables.nodes.insert(low.id.clone(), low.clone());
        tables.nodes.insert(high.id.clone(), high.clone());

        Ok(BondCommit {
            bond,
            reactivated,
            low,
            high,
        })
    }

    async fn append_events(&self, events: &[LedgerEvent]) -> FieldResult<()> {
        let mut tables = self.tables.write().await;

        let mut batch_ids = HashSet::with_capacity(events.len());
        for event in events {
            event.validate()?;
            if tables.event_ids.contains(&event.id) || !batch_ids.insert(event.id) {
                return Err(FieldError::Conflict(format!(
                    "ledger event {} already recorded",
                    event.id
                )));
            }
        }

        tables.event_ids.extend(batch_ids);
        tables.events.extend_from_slice(events);
        Ok(())
    }

    async fn list_events(&self, filter: &EventFilter) -> FieldResult<Vec<LedgerEvent>> {
        let tables = self.tables.read().await;
        let matching = tables.events.iter().rev().filter(|e| filter.matches(e));
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        })
    }

    async fn totals_by_kind(&self) -> FieldResult<HashMap<EventKind, Quantity>> {
        let tables = self.tables.read().await;
        let mut totals: HashMap<EventKind, Quantity> = HashMap::new();
        for event in &tables.events {
            *totals.entry(event.kind).or_default() += event.quantity;
        }
        Ok(totals)
    }
}
