//! Node registry operations: registration, lookup, activity scoring.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use super::models::*;
use crate::error::{FieldError, FieldResult};
use crate::store::FieldStore;

/// Registry of participants backed by a [`FieldStore`].
#[derive(Clone)]
pub struct NodeRegistry {
    store: Arc<dyn FieldStore>,
    activity_window_days: u32,
}

impl NodeRegistry {
    pub fn new(store: Arc<dyn FieldStore>, activity_window_days: u32) -> Self {
        Self {
            store,
            activity_window_days: activity_window_days.max(1),
        }
    }

    /// Register a new node. The introducer, if any, must already exist.
    pub async fn register(
        &self,
        id: NodeId,
        display_name: &str,
        introducer: Option<NodeId>,
        now: DateTime<Utc>,
    ) -> FieldResult<NodeRecord> {
        if let Some(intro) = &introducer {
            if intro == &id {
                return Err(FieldError::SelfReference(id.to_string()));
            }
            if self.store.get_node(intro).await?.is_none() {
                return Err(FieldError::node_not_found(intro));
            }
        }

        let node = NodeRecord::new(id, display_name, introducer, now);
        self.store.insert_node(&node).await?;
        info!(node = %node.id, "Registered node");
        Ok(node)
    }

    pub async fn get(&self, id: &NodeId) -> FieldResult<Option<NodeRecord>> {
        self.store.get_node(id).await
    }

    /// Fetch a node that exists and is not suspended.
    pub async fn require_active(&self, id: &NodeId) -> FieldResult<NodeRecord> {
        match self.store.get_node(id).await? {
            Some(node) if node.is_active() => Ok(node),
            _ => Err(FieldError::node_not_found(id)),
        }
    }

    pub async fn list(&self) -> FieldResult<Vec<NodeRecord>> {
        self.store.list_nodes().await
    }

    pub async fn set_status(&self, id: &NodeId, status: NodeStatus) -> FieldResult<()> {
        self.store.set_node_status(id, status).await?;
        info!(node = %id, ?status, "Node status changed");
        Ok(())
    }

    pub async fn mark_acknowledged(&self, id: &NodeId) -> FieldResult<()> {
        self.store.mark_acknowledged(id).await
    }

    pub async fn record_activity(
        &self,
        id: &NodeId,
        kind: ActivityKind,
        at: DateTime<Utc>,
    ) -> FieldResult<()> {
        if self.store.get_node(id).await?.is_none() {
            return Err(FieldError::node_not_found(id));
        }
        self.store
            .insert_activity(&ActivityEntry {
                node_id: id.clone(),
                kind,
                recorded_at: at,
            })
            .await
    }

    /// Rolling-window activity score, normalized to 0–100.
    ///
    /// One entry per day of the window saturates the score.
    pub async fn activity_score(&self, id: &NodeId, now: DateTime<Utc>) -> FieldResult<f64> {
        let since = now - Duration::days(self.activity_window_days as i64);
        let count = self.store.count_activity_since(id, since).await?;
        let score = score_from_count(count, self.activity_window_days);
        debug!(node = %id, count, score, "Activity score");
        Ok(score)
    }
}

/// `min(count / window_days * 100, 100)`, rounded to one decimal.
pub fn score_from_count(count: usize, window_days: u32) -> f64 {
    let raw = count as f64 / window_days.max(1) as f64 * 100.0;
    ((raw * 10.0).round() / 10.0).min(100.0)
}
