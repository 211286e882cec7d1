use e2e_tests::assertions::{assert_not_registered, assert_registered, assert_service_count, assert_tags};
use e2e_tests::{test_runtime, TestRegistry};
use sable_common::{AccessKeys, InMemoryAccessKeys, HEALTH_ACCESS_KEY};
use sable_naming::{NamingService, NamingServiceOptions, RegistrationPhase, ServiceSnapshot};
use sable_registry::{ConsulConnector, ACCESS_KEY_HEADER};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn snapshot(registry: &TestRegistry, name: &str, tags: &[&str], port: u16) -> ServiceSnapshot {
    let mut naming = NamingServiceOptions::new(name);
    naming.tags = tags.iter().map(|t| t.to_string()).collect();
    naming.address = Some(registry.url().clone());
    ServiceSnapshot::new(naming, test_runtime(port))
}

#[tokio::test]
async fn test_register_update_deregister() {
    let registry = TestRegistry::start().await;
    let access_keys = Arc::new(InMemoryAccessKeys::new());
    let cancel = CancellationToken::new();

    let service = NamingService::new(
        Arc::new(ConsulConnector::new()),
        access_keys.clone(),
        snapshot(&registry, "orders", &["blue"], 5000),
    )
    .unwrap();

    println!("Step 1: register");
    service.register(&cancel).await.unwrap();
    assert_eq!(service.phase().await, RegistrationPhase::Registered);
    assert_registered(registry.registry(), "orders-e2e-node-4242-5000").unwrap();

    let record = registry.registry().service("orders-e2e-node-4242-5000").unwrap();
    assert_eq!(record.address.as_deref(), Some("127.0.0.1"));
    assert_eq!(record.checks.len(), 2);
    let health = record.checks.iter().find(|c| c.name == "health").unwrap();
    assert_eq!(health.http.as_deref(), Some("http://127.0.0.1:5000/health"));
    assert_eq!(
        health.header.get(ACCESS_KEY_HEADER),
        Some(&vec![access_keys.get(HEALTH_ACCESS_KEY).unwrap()])
    );

    println!("Step 2: tags change in place");
    let plan = service
        .reconcile(snapshot(&registry, "orders", &["blue", "canary"], 5000), &CancellationToken::new())
        .await
        .unwrap();
    assert!(plan.update && !plan.reregister && !plan.reconnect);
    assert_tags(registry.registry(), "orders-e2e-node-4242-5000", &["blue", "canary"]).unwrap();
    assert_service_count(registry.registry(), 1).unwrap();

    println!("Step 3: port change moves the identity");
    let plan = service
        .reconcile(snapshot(&registry, "orders", &["blue", "canary"], 5001), &CancellationToken::new())
        .await
        .unwrap();
    assert!(plan.reregister);
    assert_not_registered(registry.registry(), "orders-e2e-node-4242-5000").unwrap();
    assert_registered(registry.registry(), "orders-e2e-node-4242-5001").unwrap();
    assert_service_count(registry.registry(), 1).unwrap();

    println!("Step 4: deregister");
    service.deregister(&cancel).await.unwrap();
    assert_eq!(service.phase().await, RegistrationPhase::Unregistered);
    assert_service_count(registry.registry(), 0).unwrap();

    registry.shutdown().await;
}

#[tokio::test]
async fn test_address_change_registers_with_new_registry() {
    let first = TestRegistry::start().await;
    let second = TestRegistry::start().await;
    let cancel = CancellationToken::new();

    let service = NamingService::new(
        Arc::new(ConsulConnector::new()),
        Arc::new(InMemoryAccessKeys::new()),
        snapshot(&first, "orders", &[], 5000),
    )
    .unwrap();
    service.register(&cancel).await.unwrap();

    let plan = service.reconcile(snapshot(&second, "orders", &[], 5000), &CancellationToken::new()).await.unwrap();
    assert!(plan.reconnect && plan.update && !plan.reregister);
    assert_registered(second.registry(), "orders-e2e-node-4242-5000").unwrap();

    // Later calls go to the new registry.
    service.deregister(&cancel).await.unwrap();
    assert_service_count(second.registry(), 0).unwrap();
}

#[tokio::test]
async fn test_reconcile_before_start_does_not_register() {
    let registry = TestRegistry::start().await;

    let service = NamingService::new(
        Arc::new(ConsulConnector::new()),
        Arc::new(InMemoryAccessKeys::new()),
        snapshot(&registry, "orders", &[], 5000),
    )
    .unwrap();

    service
        .reconcile(snapshot(&registry, "orders", &["blue"], 5000), &CancellationToken::new())
        .await
        .unwrap();
    assert_service_count(registry.registry(), 0).unwrap();

    service.register(&CancellationToken::new()).await.unwrap();
    assert_tags(registry.registry(), "orders-e2e-node-4242-5000", &["blue"]).unwrap();
}

#[tokio::test]
async fn test_token_is_sent() {
    let registry = TestRegistry::start_with_token(Some("acl-secret")).await;
    let cancel = CancellationToken::new();

    let rejected = NamingService::new(
        Arc::new(ConsulConnector::new()),
        Arc::new(InMemoryAccessKeys::new()),
        snapshot(&registry, "orders", &[], 5000),
    )
    .unwrap();
    assert!(rejected.register(&cancel).await.is_err());

    let accepted = NamingService::new(
        Arc::new(ConsulConnector::with_token(Some("acl-secret".to_string()))),
        Arc::new(InMemoryAccessKeys::new()),
        snapshot(&registry, "orders", &[], 5000),
    )
    .unwrap();
    accepted.register(&cancel).await.unwrap();
    assert_service_count(registry.registry(), 1).unwrap();
}
