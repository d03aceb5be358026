//! End-to-end tests over the public service API and an in-memory store.

use bondfield::bonds::{BondRules, BondState};
use bondfield::clock::FixedClock;
use bondfield::fixture::FieldFixture;
use bondfield::nodes::{NodeId, NodeState, MAX_BONDS};
use bondfield::propagation::{Phase, PropagationKind, Recipient};
use bondfield::store::MemoryFieldStore;
use bondfield::traversal::PathResult;
use bondfield::{Config, FieldError, FieldService, Quantity};
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

// ============================================================================
// Helpers
// ============================================================================

fn service_with(config: Config) -> (FieldService, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ));
    let service = FieldService::new(config, Arc::new(MemoryFieldStore::new()), clock.clone());
    (service, clock)
}

fn no_cooldown() -> Config {
    Config {
        bond_rules: BondRules {
            cooldown: Duration::zero(),
            cooldown_on_reactivation: false,
        },
        ..Config::default()
    }
}

async fn register(service: &FieldService, ids: &[&str]) {
    for id in ids {
        service.register_node(*id, id, None).await.unwrap();
    }
}

fn id(s: &str) -> NodeId {
    NodeId::from(s)
}

// ============================================================================
// Bonds
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_formation_respects_capacity() {
    let (service, _) = service_with(no_cooldown());
    let peers: Vec<String> = (0..12).map(|i| format!("peer-{i:02}")).collect();
    register(&service, &["hub"]).await;
    for peer in &peers {
        service.register_node(peer.as_str(), peer, None).await.unwrap();
    }

    let attempts = peers.iter().map(|peer| {
        let service = service.clone();
        let peer = id(peer);
        tokio::spawn(async move { service.form_bond(&peer, &id("hub")).await })
    });
    let results = futures::future::join_all(attempts).await;

    let mut formed = 0;
    for result in results {
        match result.unwrap() {
            Ok(_) => formed += 1,
            Err(e) => assert!(
                matches!(e, FieldError::CapacityExceeded { .. }),
                "unexpected error: {e}"
            ),
        }
    }
    assert_eq!(formed, MAX_BONDS);

    let hub = service.get_node(&id("hub")).await.unwrap().unwrap();
    assert_eq!(hub.bond_count, MAX_BONDS);
    assert_eq!(hub.state, NodeState::Saturated);
    assert_eq!(service.peers_of(&id("hub")).await.unwrap().len(), MAX_BONDS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_formation_respects_cooldown() {
    let (service, _) = service_with(Config::default());
    let peers: Vec<String> = (0..6).map(|i| format!("peer-{i}")).collect();
    register(&service, &["x"]).await;
    for peer in &peers {
        service.register_node(peer.as_str(), peer, None).await.unwrap();
    }

    let attempts = peers.iter().map(|peer| {
        let service = service.clone();
        let peer = id(peer);
        tokio::spawn(async move { service.form_bond(&id("x"), &peer).await })
    });
    let results = futures::future::join_all(attempts).await;

    let mut formed = 0;
    for result in results {
        match result.unwrap() {
            Ok(_) => formed += 1,
            Err(e) => assert!(
                matches!(e, FieldError::Cooldown { .. }),
                "unexpected error: {e}"
            ),
        }
    }
    assert_eq!(formed, 1);
    assert_eq!(
        service.get_node(&id("x")).await.unwrap().unwrap().bond_count,
        1
    );
}

#[tokio::test]
async fn test_bond_pair_is_unordered() {
    let (service, _) = service_with(no_cooldown());
    register(&service, &["a", "b"]).await;

    service.form_bond(&id("b"), &id("a")).await.unwrap();
    let ab = service.get_bond(&id("a"), &id("b")).await.unwrap().unwrap();
    let ba = service.get_bond(&id("b"), &id("a")).await.unwrap().unwrap();
    assert_eq!(ab.pair, ba.pair);
    assert_eq!(ab.created_at, ba.created_at);
    assert_eq!(ab.initiator, id("b"));

    let err = service.form_bond(&id("a"), &id("b")).await.unwrap_err();
    assert!(matches!(err, FieldError::AlreadyActive(_, _)));
    assert_eq!(service.bonds_of(&id("a")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cooldown_between_formations() {
    let (service, clock) = service_with(Config::default());
    register(&service, &["a", "b", "c"]).await;

    service.form_bond(&id("a"), &id("b")).await.unwrap();

    clock.advance(Duration::hours(1));
    let err = service.form_bond(&id("a"), &id("c")).await.unwrap_err();
    match err {
        FieldError::Cooldown { node, remaining } => {
            assert_eq!(node, "a");
            assert_eq!(remaining, Duration::hours(23));
        }
        other => panic!("expected cooldown, got {other}"),
    }

    clock.advance(Duration::hours(24));
    service.form_bond(&id("a"), &id("c")).await.unwrap();
}

#[tokio::test]
async fn test_reactivation_reuses_row() {
    let (service, clock) = service_with(Config::default());
    register(&service, &["a", "b"]).await;

    let first = service.form_bond(&id("a"), &id("b")).await.unwrap();
    clock.advance(Duration::hours(2));
    let dissolved = service.dissolve_bond(&id("b"), &id("a")).await.unwrap();
    assert_eq!(dissolved.state, BondState::Inactive);
    assert_eq!(
        service.get_node(&id("a")).await.unwrap().unwrap().bond_count,
        0
    );

    // Still inside the cooldown window, but reactivation is not a new formation.
    let again = service.form_bond(&id("b"), &id("a")).await.unwrap();
    assert!(again.reactivated);
    assert_eq!(again.bond.pair, first.bond.pair);
    assert_eq!(again.bond.created_at, first.bond.created_at);
    assert_eq!(again.bond.state, BondState::Active);
    assert_eq!(service.bonds_of(&id("a")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reactivation_can_respect_cooldown() {
    let mut config = Config::default();
    config.bond_rules.cooldown_on_reactivation = true;
    let (service, _) = service_with(config);
    register(&service, &["a", "b"]).await;

    service.form_bond(&id("a"), &id("b")).await.unwrap();
    service.dissolve_bond(&id("a"), &id("b")).await.unwrap();
    let err = service.form_bond(&id("a"), &id("b")).await.unwrap_err();
    assert!(matches!(err, FieldError::Cooldown { .. }));
}

// ============================================================================
// Traversal
// ============================================================================

#[tokio::test]
async fn test_unbonded_node_reaches_only_itself() {
    let (service, _) = service_with(Config::default());
    register(&service, &["solo", "other"]).await;

    let reach = service.reachable_from(&id("solo"), 6).await.unwrap();
    assert_eq!(reach.nodes.len(), 1);
    assert_eq!(reach.nodes[0].hop, 0);
    assert!(reach.edges.is_empty());

    let path = service.shortest_path(&id("solo"), &id("other")).await.unwrap();
    assert_eq!(path, PathResult::NoPath);

    let err = service.reachable_from(&id("ghost"), 6).await.unwrap_err();
    assert!(matches!(err, FieldError::NotFound(_)));
}

#[tokio::test]
async fn test_dissolved_bond_breaks_path() {
    let (service, _) = service_with(no_cooldown());
    register(&service, &["a", "b", "c"]).await;
    service.form_bond(&id("a"), &id("b")).await.unwrap();
    service.form_bond(&id("b"), &id("c")).await.unwrap();

    match service.shortest_path(&id("a"), &id("c")).await.unwrap() {
        PathResult::Found { path, hops } => {
            assert_eq!(hops, 2);
            assert_eq!(path, vec![id("a"), id("b"), id("c")]);
        }
        PathResult::NoPath => panic!("expected a path"),
    }

    service.dissolve_bond(&id("b"), &id("c")).await.unwrap();
    assert_eq!(
        service.shortest_path(&id("a"), &id("c")).await.unwrap(),
        PathResult::NoPath
    );
}

// ============================================================================
// Propagation and ledger
// ============================================================================

#[tokio::test]
async fn test_isolated_flow_is_fully_absorbed() {
    let (service, _) = service_with(Config::default());
    register(&service, &["o"]).await;

    let executed = service
        .execute_propagation(&id("o"), Quantity::from_whole(100), PropagationKind::Flow)
        .await
        .unwrap();
    assert!(executed.distribution.to_nodes().is_zero());

    let pools = service.ledger().pool_balances().await.unwrap();
    assert_eq!(pools["stability"], Quantity::from_whole(40));
    assert_eq!(pools["liquidity"], Quantity::from_whole(25));
    assert_eq!(pools["intelligence"], Quantity::from_whole(20));
    assert_eq!(pools["compliance"], Quantity::from_whole(15));

    let report = service.verify_conservation().await.unwrap();
    assert!(report.balanced);
    assert!(report.balance.is_zero());
}

#[tokio::test]
async fn test_distribution_sums_exactly_over_awkward_input() {
    let mut config = no_cooldown();
    config.propagation.min_activity_score = 0.0;
    let (service, _) = service_with(config);
    register(&service, &["o", "a", "b", "c", "d", "e", "f"]).await;
    for (x, y) in [("o", "a"), ("o", "b"), ("o", "c"), ("a", "d"), ("d", "e"), ("e", "f")] {
        service.form_bond(&id(x), &id(y)).await.unwrap();
    }

    let quantity: Quantity = "33.33333333".parse().unwrap();
    let executed = service
        .execute_propagation(&id("o"), quantity, PropagationKind::Flow)
        .await
        .unwrap();
    let dist = &executed.distribution;
    assert!(dist.is_exact());
    assert_eq!(dist.total(), quantity);
    assert!(dist.max_hop() <= 4);
    assert!(dist.in_phase(Phase::Propagation) <= quantity);

    let report = service.ensure_balanced().await.unwrap();
    assert_eq!(report.totals.total_in, quantity);
}

#[tokio::test]
async fn test_fixture_field_end_to_end() {
    let fixture: FieldFixture = serde_yaml::from_str(
        r#"
nodes:
  - id: intro
    activity: 3
  - id: newbie
    introducer: intro
  - id: p1
    activity: 3
  - id: p2
    activity: 3
bonds:
  - [newbie, p1]
  - [newbie, p2]
"#,
    )
    .unwrap();
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let service = fixture.build(Config::default(), clock).await.unwrap();

    let dist = service
        .preview_propagation(&id("newbie"), Quantity::from_whole(100), PropagationKind::Join)
        .await
        .unwrap();
    assert_eq!(
        dist.received_by(&Recipient::Node(id("intro"))),
        Quantity::from_whole(10)
    );
    assert_eq!(
        dist.received_by(&Recipient::Node(id("p1"))),
        Quantity::from_whole(45)
    );
    assert_eq!(
        dist.received_by(&Recipient::Node(id("p2"))),
        Quantity::from_whole(45)
    );
    assert!(dist.in_phase(Phase::Absorption).is_zero());
}
