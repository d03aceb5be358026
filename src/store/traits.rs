//! FieldStore trait definition
//!
//! Abstract persistence for nodes, bonds and ledger events. Implementations
//! own the transaction boundaries: a bond write and an event batch each
//! commit completely or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::bonds::{BondCommit, BondPair, BondPlanner, BondRecord};
use crate::error::FieldResult;
use crate::ledger::{EventFilter, EventKind, LedgerEvent};
use crate::nodes::{ActivityEntry, NodeId, NodeRecord, NodeStatus};
use crate::quantity::Quantity;

/// Persistence interface used by every field component.
#[async_trait]
pub trait FieldStore: Send + Sync {
    // ========================================================================
    // Node operations
    // ========================================================================

    /// Insert a new node. Fails with `Conflict` if the id is taken.
    async fn insert_node(&self, node: &NodeRecord) -> FieldResult<()>;

    /// Get a node by id
    async fn get_node(&self, id: &NodeId) -> FieldResult<Option<NodeRecord>>;

    /// List all nodes, ordered by id
    async fn list_nodes(&self) -> FieldResult<Vec<NodeRecord>>;

    /// Change a node's administrative status
    async fn set_node_status(&self, id: &NodeId, status: NodeStatus) -> FieldResult<()>;

    /// Set the acknowledged flag and re-derive the lifecycle state
    async fn mark_acknowledged(&self, id: &NodeId) -> FieldResult<()>;

    // ========================================================================
    // Activity operations
    // ========================================================================

    /// Append an activity entry
    async fn insert_activity(&self, entry: &ActivityEntry) -> FieldResult<()>;

    /// Count a node's entries recorded at or after `since`
    async fn count_activity_since(&self, id: &NodeId, since: DateTime<Utc>)
        -> FieldResult<usize>;

    // ========================================================================
    // Bond operations
    // ========================================================================

    /// Get the row for a canonical pair, any state
    async fn get_bond(&self, pair: &BondPair) -> FieldResult<Option<BondRecord>>;

    /// All rows touching a node, any state
    async fn list_bonds_for(&self, id: &NodeId) -> FieldResult<Vec<BondRecord>>;

    /// Pairs of every ACTIVE bond, read from one consistent snapshot
    async fn list_active_pairs(&self) -> FieldResult<Vec<BondPair>>;

    /// Run `planner` against the pair and apply its write in one transaction.
    async fn write_bond(
        &self,
        pair: &BondPair,
        planner: &dyn BondPlanner,
    ) -> FieldResult<BondCommit>;

    // ========================================================================
    // Ledger operations
    // ========================================================================

    /// Append a batch of events atomically. No event is visible unless all are.
    async fn append_events(&self, events: &[LedgerEvent]) -> FieldResult<()>;

    /// Events matching `filter`, newest first
    async fn list_events(&self, filter: &EventFilter) -> FieldResult<Vec<LedgerEvent>>;

    /// Sum of quantities per event kind
    async fn totals_by_kind(&self) -> FieldResult<HashMap<EventKind, Quantity>>;
}
