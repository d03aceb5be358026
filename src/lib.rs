//! Bond Field
//!
//! A bounded-degree participant graph with:
//! - Bond formation under a degree cap and cooldown, with in-place reactivation
//! - Breadth-first reach and shortest-path queries over active bonds
//! - Hop-decayed, exactly conserving propagation of an input quantity
//! - An append-only ledger with conservation checks

pub mod bonds;
pub mod clock;
pub mod error;
pub mod fixture;
pub mod ledger;
pub mod nodes;
pub mod propagation;
pub mod quantity;
pub mod store;
pub mod traversal;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use error::{FieldError, FieldResult};
pub use quantity::Quantity;

use anyhow::Result;
use chrono::Duration;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use bonds::{BondGraph, BondOutcome, BondRecord, BondRules, Peer};
use clock::{Clock, SystemClock};
use ledger::{ConservationReport, Ledger, LedgerEvent, LedgerTotals, NetPosition};
use nodes::{ActivityKind, NodeId, NodeRecord, NodeRegistry, NodeStatus};
use propagation::{
    Distribution, ExecutedPropagation, PropagationConfig, PropagationEngine, PropagationKind,
};
use store::{FieldStore, MemoryFieldStore};
use traversal::{Adjacency, NodeStats, PathResult, Reach, STATS_HOPS};

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub field: FieldYamlConfig,
    pub propagation: PropagationConfig,
    pub ledger: LedgerYamlConfig,
}

/// Bond graph and activity section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldYamlConfig {
    pub cooldown_hours: i64,
    pub activity_window_days: u32,
    /// Apply the formation cooldown when an INACTIVE bond is reactivated
    pub reactivation_respects_cooldown: bool,
}

impl Default for FieldYamlConfig {
    fn default() -> Self {
        Self {
            cooldown_hours: 24,
            activity_window_days: 30,
            reactivation_respects_cooldown: false,
        }
    }
}

/// Ledger section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerYamlConfig {
    /// Maximum |in - out| still reported as balanced
    pub tolerance: Quantity,
    /// Default number of events returned by history queries
    pub history_limit: usize,
}

impl Default for LedgerYamlConfig {
    fn default() -> Self {
        Self {
            tolerance: Quantity::from_units(1_000_000),
            history_limit: 50,
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Field configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub bond_rules: BondRules,
    pub activity_window_days: u32,
    pub propagation: PropagationConfig,
    pub ledger_tolerance: Quantity,
    pub history_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_yaml(YamlConfig::default())
    }
}

impl Config {
    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "bondfield.yaml" in CWD. If the file doesn't
    /// exist, falls back to env vars / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        // 1. Load YAML config (or defaults if file not found)
        let mut yaml = Self::load_yaml(yaml_path);

        // 2. Env var overrides
        let field = &mut yaml.field;
        field.cooldown_hours = env_parse("FIELD_COOLDOWN_HOURS").unwrap_or(field.cooldown_hours);
        field.activity_window_days =
            env_parse("FIELD_ACTIVITY_WINDOW_DAYS").unwrap_or(field.activity_window_days);

        let prop = &mut yaml.propagation;
        prop.horizon = env_parse("PROPAGATION_HORIZON").unwrap_or(prop.horizon);
        prop.decay_base = env_parse("PROPAGATION_DECAY_BASE").unwrap_or(prop.decay_base);
        prop.min_activity_score =
            env_parse("PROPAGATION_MIN_ACTIVITY").unwrap_or(prop.min_activity_score);

        yaml.ledger.tolerance = env_parse("LEDGER_TOLERANCE").unwrap_or(yaml.ledger.tolerance);

        // 3. Validate
        let config = Self::from_yaml(yaml);
        config.validate()?;
        Ok(config)
    }

    fn from_yaml(yaml: YamlConfig) -> Self {
        Self {
            bond_rules: BondRules {
                cooldown: Duration::hours(yaml.field.cooldown_hours),
                cooldown_on_reactivation: yaml.field.reactivation_respects_cooldown,
            },
            activity_window_days: yaml.field.activity_window_days,
            propagation: yaml.propagation,
            ledger_tolerance: yaml.ledger.tolerance,
            history_limit: yaml.ledger.history_limit,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bond_rules.cooldown < Duration::zero() {
            anyhow::bail!("field.cooldown_hours must not be negative");
        }
        if self.activity_window_days == 0 {
            anyhow::bail!("field.activity_window_days must be at least 1");
        }
        if self.ledger_tolerance.is_negative() {
            anyhow::bail!("ledger.tolerance must not be negative");
        }
        self.propagation.validate()
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("bondfield.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|s| s.trim().parse().ok())
}

// ============================================================================
// Service facade
// ============================================================================

/// Entry point wiring registry, bond graph, traversal, propagation and
/// ledger over one store and one clock.
#[derive(Clone)]
pub struct FieldService {
    store: Arc<dyn FieldStore>,
    clock: Arc<dyn Clock>,
    registry: NodeRegistry,
    bonds: BondGraph,
    propagation: PropagationEngine,
    ledger: Ledger,
    config: Arc<Config>,
}

impl std::fmt::Debug for FieldService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FieldService {
    pub fn new(config: Config, store: Arc<dyn FieldStore>, clock: Arc<dyn Clock>) -> Self {
        let registry = NodeRegistry::new(store.clone(), config.activity_window_days);
        let bonds = BondGraph::new(store.clone(), registry.clone(), config.bond_rules.clone());
        let ledger = Ledger::new(store.clone(), config.ledger_tolerance, config.history_limit);
        let propagation = PropagationEngine::new(
            store.clone(),
            registry.clone(),
            ledger.clone(),
            config.propagation.clone(),
        );
        Self {
            store,
            clock,
            registry,
            bonds,
            propagation,
            ledger,
            config: Arc::new(config),
        }
    }

    /// In-memory store and wall clock.
    pub fn in_memory(config: Config) -> Self {
        Self::new(
            config,
            Arc::new(MemoryFieldStore::new()),
            Arc::new(SystemClock),
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    pub async fn register_node(
        &self,
        id: impl Into<NodeId>,
        display_name: &str,
        introducer: Option<NodeId>,
    ) -> FieldResult<NodeRecord> {
        self.registry
            .register(id.into(), display_name, introducer, self.now())
            .await
    }

    pub async fn get_node(&self, id: &NodeId) -> FieldResult<Option<NodeRecord>> {
        self.registry.get(id).await
    }

    pub async fn list_nodes(&self) -> FieldResult<Vec<NodeRecord>> {
        self.registry.list().await
    }

    pub async fn set_node_status(&self, id: &NodeId, status: NodeStatus) -> FieldResult<()> {
        self.registry.set_status(id, status).await
    }

    pub async fn record_activity(&self, id: &NodeId, kind: ActivityKind) -> FieldResult<()> {
        self.registry.record_activity(id, kind, self.now()).await
    }

    pub async fn activity_score(&self, id: &NodeId) -> FieldResult<f64> {
        self.registry.activity_score(id, self.now()).await
    }

    // ========================================================================
    // Bonds
    // ========================================================================

    pub async fn form_bond(&self, a: &NodeId, b: &NodeId) -> FieldResult<BondOutcome> {
        self.bonds.form_bond(a, b, self.now()).await
    }

    pub async fn dissolve_bond(&self, a: &NodeId, b: &NodeId) -> FieldResult<BondRecord> {
        self.bonds.dissolve_bond(a, b, self.now()).await
    }

    pub async fn get_bond(&self, a: &NodeId, b: &NodeId) -> FieldResult<Option<BondRecord>> {
        self.bonds.get_bond(a, b).await
    }

    pub async fn bonds_of(&self, id: &NodeId) -> FieldResult<Vec<BondRecord>> {
        self.bonds.bonds_of(id).await
    }

    pub async fn peers_of(&self, id: &NodeId) -> FieldResult<Vec<Peer>> {
        self.registry.require_active(id).await?;
        self.bonds.peers_of(id).await
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Snapshot of the ACTIVE bond graph.
    pub async fn adjacency(&self) -> FieldResult<Adjacency> {
        Ok(Adjacency::from_pairs(self.store.list_active_pairs().await?))
    }

    pub async fn reachable_from(&self, origin: &NodeId, max_hops: u32) -> FieldResult<Reach> {
        self.require_known(origin).await?;
        let adj = self.adjacency().await?;
        Ok(traversal::reachable_from(
            &adj,
            origin,
            max_hops,
            self.config.propagation.decay_base,
        ))
    }

    pub async fn shortest_path(&self, a: &NodeId, b: &NodeId) -> FieldResult<PathResult> {
        self.require_known(a).await?;
        self.require_known(b).await?;
        let adj = self.adjacency().await?;
        Ok(traversal::shortest_path(&adj, a, b))
    }

    pub async fn node_stats(&self, id: &NodeId) -> FieldResult<NodeStats> {
        let node = self.require_known(id).await?;
        let now = self.now();
        let reach = self.reachable_from(id, STATS_HOPS).await?;

        let mut peer_scores = std::collections::BTreeMap::new();
        for peer in reach.peers() {
            let score = self.registry.activity_score(&peer.id, now).await?;
            peer_scores.insert(peer.id.clone(), score);
        }
        let own_score = self.registry.activity_score(id, now).await?;

        Ok(NodeStats::build(&node, &reach, own_score, &peer_scores))
    }

    async fn require_known(&self, id: &NodeId) -> FieldResult<NodeRecord> {
        self.registry
            .get(id)
            .await?
            .ok_or_else(|| FieldError::node_not_found(id))
    }

    // ========================================================================
    // Propagation
    // ========================================================================

    pub async fn preview_propagation(
        &self,
        origin: &NodeId,
        quantity: Quantity,
        kind: PropagationKind,
    ) -> FieldResult<Distribution> {
        self.propagation
            .preview(origin, quantity, kind, self.now())
            .await
    }

    pub async fn execute_propagation(
        &self,
        origin: &NodeId,
        quantity: Quantity,
        kind: PropagationKind,
    ) -> FieldResult<ExecutedPropagation> {
        self.propagation
            .execute(origin, quantity, kind, self.now())
            .await
    }

    // ========================================================================
    // Ledger
    // ========================================================================

    pub async fn record_event(&self, event: LedgerEvent) -> FieldResult<uuid::Uuid> {
        self.ledger.record(event).await
    }

    pub async fn verify_conservation(&self) -> FieldResult<ConservationReport> {
        self.ledger.verify_conservation(self.now()).await
    }

    pub async fn ensure_balanced(&self) -> FieldResult<ConservationReport> {
        self.ledger.ensure_balanced(self.now()).await
    }

    pub async fn ledger_totals(&self) -> FieldResult<LedgerTotals> {
        self.ledger.totals().await
    }

    pub async fn net_position(&self, id: &NodeId) -> FieldResult<NetPosition> {
        self.ledger.net_position(id).await
    }

    pub async fn history(
        &self,
        node: Option<&NodeId>,
        limit: Option<usize>,
    ) -> FieldResult<Vec<LedgerEvent>> {
        self.ledger.history(node, limit).await
    }
}

// ============================================================================
// Tests
// ============================================================================
