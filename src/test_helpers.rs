//! Test helper factories
//!
//! Builds in-memory services on a manually advanced clock, with helpers for
//! seeding nodes, activity and bonds.
#![allow(dead_code)]

use crate::bonds::BondRules;
use crate::clock::FixedClock;
use crate::nodes::{ActivityKind, NodeId};
use crate::store::MemoryFieldStore;
use crate::{Config, FieldService};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

/// Fixed starting instant shared by service tests.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Default config with the bond cooldown disabled.
pub fn config_without_cooldown() -> Config {
    Config {
        bond_rules: BondRules {
            cooldown: Duration::zero(),
            cooldown_on_reactivation: false,
        },
        ..Config::default()
    }
}

/// Service over an empty memory store and a clock frozen at [`epoch`].
pub fn test_service(config: Config) -> (FieldService, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(epoch()));
    let service = FieldService::new(config, Arc::new(MemoryFieldStore::new()), clock.clone());
    (service, clock)
}

/// Register each id with itself as display name and no introducer.
pub async fn register_all(service: &FieldService, ids: &[&str]) {
    for id in ids {
        service.register_node(*id, id, None).await.unwrap();
    }
}

/// Record `count` engagement entries for `id`.
pub async fn add_activity(service: &FieldService, id: &str, count: usize) {
    let id = NodeId::from(id);
    for _ in 0..count {
        service
            .record_activity(&id, ActivityKind::Engagement)
            .await
            .unwrap();
    }
}

/// Form every listed bond, panicking on the first rejection.
pub async fn bond_all(service: &FieldService, pairs: &[(&str, &str)]) {
    for (a, b) in pairs {
        service.form_bond(&(*a).into(), &(*b).into()).await.unwrap();
    }
}
