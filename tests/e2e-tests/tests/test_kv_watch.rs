use e2e_tests::{free_port, init_logging, TestRegistry};
use sable_config::{changed, ChangeToken, PollingOptions, PollingPrefixChangeToken};
use sable_registry::{ConsulClient, RegistryClient};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

fn options() -> PollingOptions {
    PollingOptions {
        wait_time: Duration::from_secs(2),
        base_failure_delay: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn test_write_under_prefix_fires_token() {
    let registry = TestRegistry::start().await;
    registry.put("apps/orders/ns/name", "orders");

    let client: Arc<dyn RegistryClient> = Arc::new(registry.client());
    let cancel = CancellationToken::new();
    let token = PollingPrefixChangeToken::watch(client, "apps/orders", options(), &cancel);

    // Let the first query set the baseline.
    assert!(e2e_tests::wait_until(Duration::from_secs(2), || async { token.state().has_baseline() }).await);
    assert!(!token.has_changed());

    registry.put("apps/orders/ns/tags/0", "blue");
    tokio::time::timeout(Duration::from_secs(5), changed(&token))
        .await
        .expect("token did not fire");
    assert!(token.has_changed());
}

#[tokio::test]
async fn test_quiet_prefix_does_not_fire() {
    let registry = TestRegistry::start().await;
    registry.put("apps/orders/ns/name", "orders");

    let client: Arc<dyn RegistryClient> = Arc::new(registry.client());
    let cancel = CancellationToken::new();
    let token = PollingPrefixChangeToken::watch(
        client,
        "apps/orders",
        PollingOptions {
            wait_time: Duration::from_millis(200),
            ..options()
        },
        &cancel,
    );

    // Several wait timeouts pass with the same index.
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(token.state().has_baseline());
    assert!(!token.has_changed());
    assert_eq!(token.state().consecutive_failures(), 0);
}

#[tokio::test]
async fn test_unreachable_registry_backs_off_without_firing() {
    init_logging();
    let address = Url::parse(&format!("http://127.0.0.1:{}", free_port())).unwrap();
    let client: Arc<dyn RegistryClient> = Arc::new(ConsulClient::new(address));
    let cancel = CancellationToken::new();

    let token = PollingPrefixChangeToken::watch(client, "apps/orders", options(), &cancel);

    assert!(e2e_tests::wait_until(Duration::from_secs(3), || async { token.state().consecutive_failures() >= 3 }).await);
    assert!(!token.has_changed());
    assert!(!token.state().has_baseline());

    cancel.cancel();
}

#[tokio::test]
async fn test_cancelled_watch_stops_querying() {
    let registry = TestRegistry::start().await;
    registry.put("apps/orders/ns/name", "orders");

    let client: Arc<dyn RegistryClient> = Arc::new(registry.client());
    let cancel = CancellationToken::new();
    let token = PollingPrefixChangeToken::watch(client, "apps/orders", options(), &cancel);
    assert!(e2e_tests::wait_until(Duration::from_secs(2), || async { token.state().has_baseline() }).await);

    cancel.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;

    registry.put("apps/orders/ns/name", "payments");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!token.has_changed());
}
