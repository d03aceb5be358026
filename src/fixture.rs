//! YAML field fixtures for the CLI and tests.
//!
//! ```yaml
//! nodes:
//!   - id: alice
//!     name: Alice
//!   - id: bob
//!     introducer: alice
//!     activity: 3
//! bonds:
//!   - [alice, bob]
//! ```

use anyhow::{Context, Result};
use chrono::Duration;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use crate::clock::Clock;
use crate::nodes::{ActivityKind, NodeId};
use crate::store::{FieldStore, MemoryFieldStore};
use crate::{Config, FieldService};

/// One node of a fixture.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureNode {
    pub id: NodeId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub introducer: Option<NodeId>,
    /// Engagement entries recorded at load time.
    #[serde(default)]
    pub activity: usize,
}

/// A whole field: nodes first, then bonds in formation order.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FieldFixture {
    pub nodes: Vec<FixtureNode>,
    pub bonds: Vec<(NodeId, NodeId)>,
}

impl FieldFixture {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing fixture {}", path.display()))
    }

    /// Build an in-memory service holding this field.
    ///
    /// Bonds are seeded back to back with the cooldown off; the returned
    /// service enforces `config` as given.
    pub async fn build(&self, config: Config, clock: Arc<dyn Clock>) -> Result<FieldService> {
        let store: Arc<dyn FieldStore> = Arc::new(MemoryFieldStore::new());
        let mut seeding = config.clone();
        seeding.bond_rules.cooldown = Duration::zero();
        let service = FieldService::new(seeding, store.clone(), clock.clone());

        for node in &self.nodes {
            let name = node.name.as_deref().unwrap_or(node.id.as_str());
            service
                .register_node(node.id.clone(), name, node.introducer.clone())
                .await
                .with_context(|| format!("registering {}", node.id))?;
            for _ in 0..node.activity {
                service
                    .record_activity(&node.id, ActivityKind::Engagement)
                    .await?;
            }
        }

        for (a, b) in &self.bonds {
            service
                .form_bond(a, b)
                .await
                .with_context(|| format!("bonding {a} <-> {b}"))?;
        }

        tracing::info!(
            nodes = self.nodes.len(),
            bonds = self.bonds.len(),
            "Fixture loaded"
        );
        Ok(FieldService::new(config, store, clock))
    }
}
