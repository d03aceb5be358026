//! Ledger operations: append, conservation check and queries.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::models::*;
use crate::error::{FieldError, FieldResult};
use crate::nodes::NodeId;
use crate::quantity::Quantity;
use crate::store::FieldStore;

/// Append-only ledger backed by a [`FieldStore`].
///
/// There is no update or delete path: corrections are new events.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn FieldStore>,
    tolerance: Quantity,
    history_limit: usize,
}

impl Ledger {
    pub fn new(store: Arc<dyn FieldStore>, tolerance: Quantity, history_limit: usize) -> Self {
        Self {
            store,
            tolerance: tolerance.abs(),
            history_limit: history_limit.max(1),
        }
    }

    pub fn tolerance(&self) -> Quantity {
        self.tolerance
    }

    /// Append a single event.
    pub async fn record(&self, event: LedgerEvent) -> FieldResult<Uuid> {
        let id = event.id;
        self.store.append_events(std::slice::from_ref(&event)).await?;
        debug!(
            event = %id,
            kind = %event.kind,
            quantity = %event.quantity,
            "Ledger event recorded"
        );
        Ok(id)
    }

    /// Append a batch atomically: either every event is recorded or none is.
    pub async fn record_batch(&self, events: &[LedgerEvent]) -> FieldResult<Vec<Uuid>> {
        self.store.append_events(events).await?;
        info!(count = events.len(), "Ledger batch recorded");
        Ok(events.iter().map(|e| e.id).collect())
    }

    pub async fn totals(&self) -> FieldResult<LedgerTotals> {
        let by_kind = self.store.totals_by_kind().await?;
        Ok(LedgerTotals::from_kinds(&by_kind))
    }

    /// Check `in == routed + stored + pooled + burned` within tolerance.
    pub async fn verify_conservation(
        &self,
        now: DateTime<Utc>,
    ) -> FieldResult<ConservationReport> {
        let totals = self.totals().await?;
        let total_out = totals.total_out();
        let balance = totals.balance();
        let balanced = balance.abs() <= self.tolerance;

        debug!(
            total_in = %totals.total_in,
            total_out = %total_out,
            balance = %balance,
            balanced,
            "Conservation verified"
        );

        Ok(ConservationReport {
            totals,
            total_out,
            balance,
            tolerance: self.tolerance,
            balanced,
            checked_at: now,
        })
    }

    /// Like [`verify_conservation`](Self::verify_conservation), but an
    /// unbalanced ledger is an error.
    pub async fn ensure_balanced(&self, now: DateTime<Utc>) -> FieldResult<ConservationReport> {
        let report = self.verify_conservation(now).await?;
        if !report.balanced {
            error!(
                total_in = %report.totals.total_in,
                total_out = %report.total_out,
                balance = %report.balance,
                "Ledger conservation invariant violated"
            );
            return Err(FieldError::InvariantViolation {
                total_in: report.totals.total_in,
                total_out: report.total_out,
                balance: report.balance,
            });
        }
        Ok(report)
    }

    /// Inflow minus outflow for a node over the whole ledger.
    pub async fn net_position(&self, node: &NodeId) -> FieldResult<NetPosition> {
        let events = self.store.list_events(&Self::node_filter(node)).await?;
        let is = |a: &Option<Account>| a.as_ref().and_then(Account::as_node) == Some(node);

        let mut inflow = Quantity::ZERO;
        let mut outflow = Quantity::ZERO;
        for event in &events {
            if is(&event.destination) {
                inflow += event.quantity;
            }
            if is(&event.source) {
                outflow += event.quantity;
            }
        }

        Ok(NetPosition {
            node: node.clone(),
            inflow,
            outflow,
            net: inflow - outflow,
        })
    }

    /// Most recent events, for one node or globally.
    ///
    /// `limit` defaults to the configured history limit.
    pub async fn history(
        &self,
        node: Option<&NodeId>,
        limit: Option<usize>,
    ) -> FieldResult<Vec<LedgerEvent>> {
        let filter = EventFilter {
            node: node.cloned(),
            limit: Some(limit.unwrap_or(self.history_limit)),
            ..Default::default()
        };
        self.store.list_events(&filter).await
    }

    /// Events produced by one operation.
    pub async fn by_reference(&self, reference: Uuid) -> FieldResult<Vec<LedgerEvent>> {
        let filter = EventFilter {
            reference: Some(reference),
            ..Default::default()
        };
        self.store.list_events(&filter).await
    }

    /// Quantity received by a node, per event kind.
    pub async fn received_breakdown(
        &self,
        node: &NodeId,
    ) -> FieldResult<BTreeMap<EventKind, Quantity>> {
        let events = self.store.list_events(&Self::node_filter(node)).await?;
        let mut breakdown = BTreeMap::new();
        for event in events
            .iter()
            .filter(|e| e.destination.as_ref().and_then(Account::as_node) == Some(node))
        {
            *breakdown.entry(event.kind).or_insert(Quantity::ZERO) += event.quantity;
        }
        Ok(breakdown)
    }

    /// Total pooled quantity per pool name.
    pub async fn pool_balances(&self) -> FieldResult<BTreeMap<String, Quantity>> {
        let filter = EventFilter {
            kind: Some(EventKind::Pool),
            ..Default::default()
        };
        let mut balances = BTreeMap::new();
        for event in self.store.list_events(&filter).await? {
            if let Some(pool) = event.pool {
                *balances.entry(pool).or_insert(Quantity::ZERO) += event.quantity;
            }
        }
        Ok(balances)
    }

    /// `(routed + stored + pooled) / in`, or 1.0 when nothing flowed in.
    pub async fn flow_efficiency(&self) -> FieldResult<f64> {
        let totals = self.totals().await?;
        if !totals.total_in.is_positive() {
            return Ok(1.0);
        }
        let retained = totals.total_routed + totals.total_stored + totals.total_pooled;
        Ok(retained.to_f64() / totals.total_in.to_f64())
    }

    fn node_filter(node: &NodeId) -> EventFilter {
        EventFilter {
            node: Some(node.clone()),
            ..Default::default()
        }
    }
}
