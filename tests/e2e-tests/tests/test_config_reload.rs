use e2e_tests::assertions::assert_tags;
use e2e_tests::{test_runtime, wait_until, TestRegistry};
use sable_common::{InMemoryAccessKeys, RuntimeOptions};
use sable_config::{
    ConfigurationData, ConfigurationRoot, ConfigurationSource, DefaultKeyMapper, KeyValueConfigurationProvider,
    MemorySource, OptionsMonitor, PollingOptions, RegistryKeyValueStore,
};
use sable_naming::{NamingService, NamingServiceOptions, ServiceSnapshot, NAMING_SECTION};
use sable_registry::{ConsulConnector, RegistryClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

fn provider(registry: &TestRegistry, prefix: &str, cancel: &CancellationToken) -> Arc<KeyValueConfigurationProvider> {
    let client: Arc<dyn RegistryClient> = Arc::new(registry.client());
    let store = RegistryKeyValueStore::new(
        client,
        PollingOptions {
            wait_time: Duration::from_secs(2),
            base_failure_delay: Duration::from_millis(20),
        },
        cancel.clone(),
    );
    Arc::new(KeyValueConfigurationProvider::new(
        Arc::new(store),
        Arc::new(DefaultKeyMapper::new(prefix)),
    ))
}

#[tokio::test]
async fn test_provider_follows_prefix() {
    let registry = TestRegistry::start().await;
    registry.put("apps/orders/ns/name", "orders");
    registry.put("apps/orders/ns/tags/0", "blue");
    registry.put("apps/orders-legacy/ns/name", "legacy");

    let cancel = CancellationToken::new();
    let provider = provider(&registry, "apps/orders", &cancel);
    provider.load().await.unwrap();

    let data = provider.data();
    assert_eq!(data.get("ns:name"), Some("orders"));
    assert_eq!(data.get("ns:tags:0"), Some("blue"));
    assert_eq!(data.len(), 2);

    provider.start_watching(cancel.clone());
    registry.put("apps/orders/ns/tags/1", "canary");

    let reloaded = wait_until(Duration::from_secs(5), || {
        let provider = Arc::clone(&provider);
        async move { provider.data().get("ns:tags:1") == Some("canary") }
    })
    .await;
    assert!(reloaded, "provider did not pick up the new key");

    cancel.cancel();
}

#[tokio::test]
async fn test_registry_change_reaches_registration() {
    let registry = TestRegistry::start().await;
    registry.put("apps/orders/ns/name", "orders");
    registry.put("apps/orders/ns/tags/0", "blue");
    registry.put("apps/orders/ns/address", registry.url().as_str());

    let cancel = CancellationToken::new();
    let provider = provider(&registry, "apps/orders", &cancel);
    provider.load().await.unwrap();

    let root = Arc::new(ConfigurationRoot::new(vec![
        Arc::new(MemorySource::new("defaults", ConfigurationData::new())) as Arc<dyn ConfigurationSource>,
        Arc::clone(&provider) as Arc<dyn ConfigurationSource>,
    ]));

    println!("Step 1: bind and register");
    let naming = Arc::new(OptionsMonitor::<NamingServiceOptions>::bind(&root, NAMING_SECTION).unwrap());
    assert_eq!(naming.current().tags, vec!["blue".to_string()]);

    let runtime = test_runtime(5000);
    let (_runtime_tx, runtime_rx) = watch::channel::<RuntimeOptions>(runtime.clone());
    let service = Arc::new(
        NamingService::new(
            Arc::new(ConsulConnector::new()),
            Arc::new(InMemoryAccessKeys::new()),
            ServiceSnapshot::new(naming.current(), runtime),
        )
        .unwrap(),
    );
    service.register(&cancel).await.unwrap();
    assert_tags(registry.registry(), "orders-e2e-node-4242-5000", &["blue"]).unwrap();

    provider.start_watching(cancel.clone());
    naming.watch(Arc::clone(&root), cancel.clone());
    service.watch_options(naming.subscribe(), runtime_rx, cancel.clone());

    println!("Step 2: change tags in the registry");
    registry.put("apps/orders/ns/tags/1", "canary");

    let updated = wait_until(Duration::from_secs(5), || async {
        assert_tags(registry.registry(), "orders-e2e-node-4242-5000", &["blue", "canary"]).is_ok()
    })
    .await;
    assert!(updated, "registration did not follow the registry change");

    println!("Step 3: a malformed value keeps the previous options");
    registry.put("apps/orders/ns/checkInterval", "soon");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(naming.current().tags, vec!["blue".to_string(), "canary".to_string()]);
    assert_eq!(naming.current().check_interval, None);

    cancel.cancel();
}
