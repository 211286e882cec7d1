use e2e_tests::assertions::{assert_registered, assert_service_count, assert_tags};
use e2e_tests::{free_port, test_facts, wait_until, TestRegistry};
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{Request, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use sable_common::Error;
use sable_host::{HostOptions, ServiceHost};
use sable_registry::ACCESS_KEY_HEADER;
use std::net::SocketAddr;
use std::time::Duration;

fn host_options(registry_url: &str, port: u16, extra: &[&str]) -> HostOptions {
    let mut overrides = vec![
        "ns:name=orders".to_string(),
        format!("ns:address={}", registry_url),
        "runtime:interface=127.0.0.1".to_string(),
    ];
    overrides.extend(extra.iter().map(|s| s.to_string()));
    HostOptions {
        port: Some(port),
        overrides,
        ..HostOptions::default()
    }
}

async fn get(addr: SocketAddr, path: &str, key: Option<&str>) -> (StatusCode, String) {
    let client = Client::builder(TokioExecutor::new()).build_http::<Empty<Bytes>>();
    let mut request = Request::get(format!("http://{}{}", addr, path));
    if let Some(key) = key {
        request = request.header(ACCESS_KEY_HEADER, key);
    }
    let response = client.request(request.body(Empty::new()).unwrap()).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&body).into_owned())
}

#[tokio::test]
async fn test_host_lifecycle() {
    let registry = TestRegistry::start().await;
    let port = free_port();
    let id = format!("orders-e2e-node-7-{}", port);

    println!("Step 1: start the host");
    let host = ServiceHost::build_with(host_options(registry.url().as_str(), port, &[]), test_facts(7), None)
        .await
        .unwrap();
    let key = host.health_access_key();
    let running = host.start().await.unwrap();
    assert_registered(registry.registry(), &id).unwrap();

    let record = registry.registry().service(&id).unwrap();
    assert_eq!(record.port, port);
    assert_eq!(record.address.as_deref(), Some("127.0.0.1"));

    println!("Step 2: the checks the registry would run");
    let (status, body) = get(running.local_addr(), "/ping", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "pong");

    let (status, _) = get(running.local_addr(), "/health", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = get(running.local_addr(), "/health", Some(&key)).await;
    assert_eq!(status, StatusCode::OK);
    let report: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(report["status"], "healthy");

    running.host().health_switch().unhealthy();
    let (status, _) = get(running.local_addr(), "/health", Some(&key)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    println!("Step 3: stop deregisters");
    running.stop().await.unwrap();
    assert_service_count(registry.registry(), 0).unwrap();
}

#[tokio::test]
async fn test_unreachable_registry_is_fatal() {
    let closed = format!("http://127.0.0.1:{}", free_port());
    let host = ServiceHost::build_with(host_options(&closed, free_port(), &[]), test_facts(7), None)
        .await
        .unwrap();

    match host.start().await {
        Err(Error::FatalRegistration { instance_id, .. }) => assert!(instance_id.starts_with("orders-e2e-node-7-")),
        Err(other) => panic!("expected a fatal registration error, got {}", other),
        Ok(_) => panic!("start must fail without a registry"),
    }
}

#[tokio::test]
async fn test_registry_configuration_layer_drives_registration() {
    let registry = TestRegistry::start().await;
    registry.put("apps/orders/ns/tags/0", "blue");

    let port = free_port();
    let id = format!("orders-e2e-node-7-{}", port);
    let options = host_options(
        registry.url().as_str(),
        port,
        &[
            "kv:prefix=apps/orders",
            &format!("kv:address={}", registry.url()),
            "kv:waitTime=2s",
        ],
    );

    let host = ServiceHost::build_with(options, test_facts(7), None).await.unwrap();
    let running = host.start().await.unwrap();
    assert_tags(registry.registry(), &id, &["blue"]).unwrap();

    registry.put("apps/orders/ns/tags/1", "canary");
    let updated = wait_until(Duration::from_secs(5), || async {
        assert_tags(registry.registry(), &id, &["blue", "canary"]).is_ok()
    })
    .await;
    assert!(updated, "registration did not follow the registry configuration");

    running.stop().await.unwrap();
    assert_service_count(registry.registry(), 0).unwrap();
}
