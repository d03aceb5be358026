//! Ledger models: event kinds, accounts, events, totals and reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{FieldError, FieldResult};
use crate::nodes::NodeId;
use crate::quantity::Quantity;

// ============================================================================
// Event kind
// ============================================================================

/// Kind of quantity movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// External inflow into the field
    In,
    /// Allocation to a node
    Route,
    /// Quantity placed in storage by a node
    Store,
    /// Allocation to a named pool
    Pool,
    /// Quantity leaving the field
    Burn,
    /// Stored quantity redeemed
    Redeem,
    /// Stored quantity cancelled
    Cancel,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        Self::In,
        Self::Route,
        Self::Store,
        Self::Pool,
        Self::Burn,
        Self::Redeem,
        Self::Cancel,
    ];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => write!(f, "IN"),
            Self::Route => write!(f, "ROUTE"),
            Self::Store => write!(f, "STORE"),
            Self::Pool => write!(f, "POOL"),
            Self::Burn => write!(f, "BURN"),
            Self::Redeem => write!(f, "REDEEM"),
            Self::Cancel => write!(f, "CANCEL"),
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "IN" => Ok(Self::In),
            "ROUTE" => Ok(Self::Route),
            "STORE" => Ok(Self::Store),
            "POOL" => Ok(Self::Pool),
            "BURN" => Ok(Self::Burn),
            "REDEEM" => Ok(Self::Redeem),
            "CANCEL" => Ok(Self::Cancel),
            _ => Err(format!("Unknown event kind: {}", s)),
        }
    }
}

// ============================================================================
// Accounts
// ============================================================================

/// Source or destination of a ledger event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Account {
    Node(NodeId),
    Pool(String),
    ExternalBurn,
}

impl Account {
    pub fn node(id: impl Into<NodeId>) -> Self {
        Self::Node(id.into())
    }

    pub fn pool(name: impl Into<String>) -> Self {
        Self::Pool(name.into())
    }

    pub fn as_node(&self) -> Option<&NodeId> {
        match self {
            Self::Node(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_pool(&self) -> Option<&str> {
        match self {
            Self::Pool(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => write!(f, "{id}"),
            Self::Pool(name) => write!(f, "pool:{name}"),
            Self::ExternalBurn => write!(f, "burn"),
        }
    }
}

// ============================================================================
// Event
// ============================================================================

/// An immutable ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: Uuid,
    pub kind: EventKind,
    /// `None` for external inflow.
    pub source: Option<Account>,
    /// `None` only for burns.
    pub destination: Option<Account>,
    pub quantity: Quantity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hop: Option<u32>,
    /// Pool name when the destination is a pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    /// Links events produced by the same operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Uuid>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEvent {
    pub fn new(kind: EventKind, quantity: Quantity, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            source: None,
            destination: None,
            quantity,
            hop: None,
            pool: None,
            reference: None,
            metadata: serde_json::Map::new(),
            recorded_at,
        }
    }

    pub fn with_source(mut self, source: Account) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the destination; a pool destination also fills `pool`.
    pub fn with_destination(mut self, destination: Account) -> Self {
        self.pool = destination.as_pool().map(str::to_string);
        self.destination = Some(destination);
        self
    }

    pub fn with_hop(mut self, hop: u32) -> Self {
        self.hop = Some(hop);
        self
    }

    pub fn with_reference(mut self, reference: Uuid) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Whether `node` is the source or destination.
    pub fn touches(&self, node: &NodeId) -> bool {
        let is = |a: &Option<Account>| a.as_ref().and_then(Account::as_node) == Some(node);
        is(&self.source) || is(&self.destination)
    }

    /// Reject events whose shape does not fit their kind.
    pub fn validate(&self) -> FieldResult<()> {
        if self.quantity.is_negative() {
            return Err(FieldError::InvalidQuantity(format!(
                "event {} carries negative quantity {}",
                self.id, self.quantity
            )));
        }
        let bad = |why: &str| {
            Err(FieldError::InvalidEvent(format!(
                "{} {}: {why}",
                self.kind, self.id
            )))
        };
        match (self.kind, &self.destination) {
            (EventKind::In, None) => bad("inflow needs a destination"),
            (EventKind::Route, Some(Account::Node(_))) => Ok(()),
            (EventKind::Route, _) => bad("route destination must be a node"),
            (EventKind::Pool, Some(Account::Pool(_))) => Ok(()),
            (EventKind::Pool, _) => bad("pool destination must be a pool"),
            (EventKind::Burn, None | Some(Account::ExternalBurn)) => Ok(()),
            (EventKind::Burn, _) => bad("burn destination must be external"),
            (_, Some(Account::ExternalBurn)) => bad("only burns may leave the field"),
            _ => Ok(()),
        }
    }
}

/// Query over ledger events. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub node: Option<NodeId>,
    pub kind: Option<EventKind>,
    pub reference: Option<Uuid>,
    pub limit: Option<usize>,
}

impl EventFilter {
    pub fn matches(&self, event: &LedgerEvent) -> bool {
        self.node.as_ref().map_or(true, |n| event.touches(n))
            && self.kind.map_or(true, |k| event.kind == k)
            && self.reference.map_or(true, |r| event.reference == Some(r))
    }
}

// ============================================================================
// Totals and reports
// ============================================================================

/// Per-kind totals. This is the read model the reserve-ratio
/// calculator consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub total_in: Quantity,
    pub total_routed: Quantity,
    pub total_stored: Quantity,
    pub total_pooled: Quantity,
    pub total_burned: Quantity,
    pub total_redeemed: Quantity,
    pub total_cancelled: Quantity,
}

impl LedgerTotals {
    pub fn from_kinds(by_kind: &HashMap<EventKind, Quantity>) -> Self {
        let get = |k| by_kind.get(&k).copied().unwrap_or_default();
        Self {
            total_in: get(EventKind::In),
            total_routed: get(EventKind::Route),
            total_stored: get(EventKind::Store),
            total_pooled: get(EventKind::Pool),
            total_burned: get(EventKind::Burn),
            total_redeemed: get(EventKind::Redeem),
            total_cancelled: get(EventKind::Cancel),
        }
    }

    /// Routed + stored + pooled + burned. Redemptions and cancellations
    /// draw from stored quantity and are not part of the balance.
    pub fn total_out(&self) -> Quantity {
        self.total_routed + self.total_stored + self.total_pooled + self.total_burned
    }

    /// `in - out`; zero when balanced.
    pub fn balance(&self) -> Quantity {
        self.total_in - self.total_out()
    }
}

/// Result of a conservation check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConservationReport {
    pub totals: LedgerTotals,
    pub total_out: Quantity,
    pub balance: Quantity,
    pub tolerance: Quantity,
    pub balanced: bool,
    pub checked_at: DateTime<Utc>,
}

/// Inflow and outflow of a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetPosition {
    pub node: NodeId,
    pub inflow: Quantity,
    pub outflow: Quantity,
    pub net: Quantity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_destination_sets_pool_name() {
        let event = LedgerEvent::new(EventKind::Pool, Quantity::from_whole(4), Utc::now())
            .with_source(Account::node("a"))
            .with_destination(Account::pool("stability"));
        assert_eq!(event.pool.as_deref(), Some("stability"));
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_validate_shapes() {
        let now = Utc::now();
        let q = Quantity::from_whole(1);

        let route_to_pool =
            LedgerEvent::new(EventKind::Route, q, now).with_destination(Account::pool("x"));
        assert!(matches!(
            route_to_pool.validate(),
            Err(FieldError::InvalidEvent(_))
        ));

        let inflow = LedgerEvent::new(EventKind::In, q, now);
        assert!(inflow.validate().is_err());

        let burn = LedgerEvent::new(EventKind::Burn, q, now)
            .with_source(Account::node("a"))
            .with_destination(Account::ExternalBurn);
        assert!(burn.validate().is_ok());

        let negative =
            LedgerEvent::new(EventKind::In, -q, now).with_destination(Account::node("a"));
        assert!(matches!(
            negative.validate(),
            Err(FieldError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn test_account_serde_tagged() {
        let json = serde_json::to_string(&Account::node("a")).unwrap();
        assert_eq!(json, r#"{"type":"node","id":"a"}"#);
        let back: Account = serde_json::from_str(r#"{"type":"external_burn"}"#).unwrap();
        assert_eq!(back, Account::ExternalBurn);
    }

    #[test]
    fn test_event_kind_wire_name() {
        assert_eq!(serde_json::to_string(&EventKind::Route).unwrap(), "\"ROUTE\"");
        assert_eq!("pool".parse::<EventKind>().unwrap(), EventKind::Pool);
    }

    #[test]
    fn test_filter_by_node() {
        let event = LedgerEvent::new(EventKind::Route, Quantity::from_whole(1), Utc::now())
            .with_source(Account::node("a"))
            .with_destination(Account::node("b"));
        let filter = EventFilter {
            node: Some("b".into()),
            ..Default::default()
        };
        assert!(filter.matches(&event));
        let other = EventFilter {
            node: Some("c".into()),
            ..Default::default()
        };
        assert!(!other.matches(&event));
    }

    #[test]
    fn test_totals_balance() {
        let mut by_kind = HashMap::new();
        by_kind.insert(EventKind::In, Quantity::from_whole(100));
        by_kind.insert(EventKind::Route, Quantity::from_whole(60));
        by_kind.insert(EventKind::Pool, Quantity::from_whole(40));
        by_kind.insert(EventKind::Redeem, Quantity::from_whole(7));
        let totals = LedgerTotals::from_kinds(&by_kind);
        assert_eq!(totals.total_out(), Quantity::from_whole(100));
        assert!(totals.balance().is_zero());
    }
}
