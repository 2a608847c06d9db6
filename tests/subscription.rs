mod common;

use std::time::Duration;

use common::{proxies_yaml, start_mock_source, start_stalled_source, write_file, MockResponse};
use proxy_master::config::{Addition, ServerConfig};
use proxy_master::subscription::{SubscriptionService, ZERO_USAGE};

fn addition(url: String, group: &str, rules: &[&str]) -> Addition {
    Addition {
        url,
        group_name: group.to_string(),
        group_type: "select".to_string(),
        prepend_rules: rules.iter().map(|r| r.to_string()).collect(),
    }
}

fn server_config(base: &std::path::Path, additions: Vec<Addition>) -> ServerConfig {
    ServerConfig {
        base_document_path: base.to_string_lossy().into_owned(),
        tokens: vec!["secret".to_string()],
        additions,
        ..ServerConfig::default()
    }
}

#[tokio::test]
async fn test_single_addition_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_file(dir.path(), "base.yaml", &proxies_yaml(&["base-node"]));
    let source = start_mock_source(MockResponse::yaml(&proxies_yaml(&["extra-node"]))).await;

    let config = server_config(
        &base,
        vec![addition(source.url("/feed"), "G", &["DOMAIN-SUFFIX,example.com,G"])],
    );
    let service = SubscriptionService::new(&config, None).unwrap();

    let (document, userinfo) = service.generate_config().await.unwrap();
    assert_eq!(document.proxy_names(), vec!["base-node", "extra-node"]);
    assert_eq!(document.proxy_groups.len(), 1);
    assert_eq!(document.proxy_groups[0].name, "G");
    assert_eq!(document.proxy_groups[0].kind, "select");
    assert_eq!(document.proxy_groups[0].proxies, vec!["extra-node"]);
    assert_eq!(document.rules, vec!["DOMAIN-SUFFIX,example.com,G"]);
    assert_eq!(userinfo, ZERO_USAGE);
}

#[tokio::test]
async fn test_dependencies_cached_within_ttl() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_file(dir.path(), "base.yaml", &proxies_yaml(&["base-node"]));
    let source = start_mock_source(MockResponse::yaml(&proxies_yaml(&["a", "b"]))).await;

    let config = server_config(&base, vec![addition(source.url("/"), "G", &[])]);
    let service = SubscriptionService::new(&config, None).unwrap();

    let first = service.get_dependencies().await;
    let second = service.get_dependencies().await;
    service.generate_config().await.unwrap();

    assert_eq!(source.hits(), 1);
    assert_eq!(first, second);
    assert_eq!(first.proxies.len(), 2);
}

#[tokio::test]
async fn test_dependencies_refetched_after_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_file(dir.path(), "base.yaml", &proxies_yaml(&["base-node"]));
    let source = start_mock_source(MockResponse::yaml(&proxies_yaml(&["a"]))).await;

    let config = server_config(&base, vec![addition(source.url("/"), "G", &[])]);
    let service = SubscriptionService::new(&config, None)
        .unwrap()
        .with_dependency_ttl(Duration::from_millis(50));

    service.get_dependencies().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    service.get_dependencies().await;

    assert_eq!(source.hits(), 2);
}

#[tokio::test]
async fn test_failing_addition_is_omitted() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_file(dir.path(), "base.yaml", &proxies_yaml(&["base-node"]));
    let healthy = start_mock_source(MockResponse::yaml(&proxies_yaml(&["ok-node"]))).await;
    let broken = start_mock_source(MockResponse::status(500)).await;
    let garbage = start_mock_source(MockResponse::yaml("proxies: [unterminated")).await;

    let config = server_config(
        &base,
        vec![
            addition(broken.url("/"), "Broken", &["MATCH,Broken"]),
            addition(healthy.url("/"), "Healthy", &["MATCH,Healthy"]),
            addition(garbage.url("/"), "Garbage", &["MATCH,Garbage"]),
        ],
    );
    let service = SubscriptionService::new(&config, None).unwrap();

    let (document, _) = service.generate_config().await.unwrap();
    assert_eq!(document.proxy_names(), vec!["base-node", "ok-node"]);
    let groups: Vec<_> = document.proxy_groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(groups, vec!["Healthy"]);
    assert_eq!(document.rules, vec!["MATCH,Healthy"]);
    assert_eq!(broken.hits(), 1);
}

#[tokio::test]
async fn test_prepend_lists_stay_contiguous_ahead_of_base() {
    let dir = tempfile::tempdir().unwrap();
    let base = format!("{}rules:\n  - MATCH,DIRECT\n", proxies_yaml(&["base-node"]));
    let base = write_file(dir.path(), "base.yaml", &base);
    let first = start_mock_source(MockResponse::yaml(&proxies_yaml(&["a1", "a2"]))).await;
    let second = start_mock_source(MockResponse::yaml(&proxies_yaml(&["b1"]))).await;

    let config = server_config(
        &base,
        vec![
            addition(first.url("/"), "A", &["RULE,a,1", "RULE,a,2"]),
            addition(second.url("/"), "B", &["RULE,b,1", "RULE,b,2"]),
        ],
    );
    let service = SubscriptionService::new(&config, None).unwrap();
    let (document, _) = service.generate_config().await.unwrap();

    let a = ["RULE,a,1", "RULE,a,2"];
    let b = ["RULE,b,1", "RULE,b,2"];
    let rules: Vec<&str> = document.rules.iter().map(String::as_str).collect();
    assert_eq!(rules.len(), 5);
    assert_eq!(rules[4], "MATCH,DIRECT");
    assert!(
        rules[..4] == [a[0], a[1], b[0], b[1]] || rules[..4] == [b[0], b[1], a[0], a[1]],
        "unexpected order {:?}",
        rules
    );

    for group in &document.proxy_groups {
        let expected: Vec<String> = match group.name.as_str() {
            "A" => vec!["a1".into(), "a2".into()],
            "B" => vec!["b1".into()],
            other => panic!("unexpected group {}", other),
        };
        assert_eq!(group.proxies, expected);
    }
    assert_eq!(document.proxies.len(), 4);
}

#[tokio::test]
async fn test_longest_userinfo_wins_and_client_identifier_sent() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_file(dir.path(), "base.yaml", &proxies_yaml(&["base-node"]));
    let short = start_mock_source(
        MockResponse::yaml(&proxies_yaml(&["s"]))
            .with_header("subscription-userinfo", "upload=1; download=2"),
    )
    .await;
    let long = start_mock_source(
        MockResponse::yaml(&proxies_yaml(&["l"])).with_header(
            "Subscription-Userinfo",
            "upload=10; download=20; total=1000; expire=1900000000",
        ),
    )
    .await;

    let config = server_config(
        &base,
        vec![
            addition(short.url("/"), "Short", &[]),
            addition(long.url("/"), "Long", &[]),
        ],
    );
    let service = SubscriptionService::new(&config, None).unwrap();
    let (_, userinfo) = service.generate_config().await.unwrap();

    assert_eq!(userinfo, "upload=10; download=20; total=1000; expire=1900000000");
    let head = short.requests()[0].to_ascii_lowercase();
    assert!(head.contains("user-agent: clash"), "{}", head);
}

#[tokio::test]
async fn test_opaque_proxy_fields_pass_through() {
    let dir = tempfile::tempdir().unwrap();
    let base = "proxies:\n  - name: vm\n    type: vmess\n    server: 1.2.3.4\n    port: 8443\n    uuid: 0a1b\n    ws-opts:\n      path: /ray\n";
    let base = write_file(dir.path(), "base.yaml", base);
    let service = SubscriptionService::new(&server_config(&base, Vec::new()), None).unwrap();

    let (document, _) = service.generate_config().await.unwrap();
    let yaml = document.to_yaml().unwrap();
    assert!(yaml.contains("uuid: 0a1b"));
    assert!(yaml.contains("path: /ray"));
    assert!(yaml.contains("port: 8443"));
}

#[tokio::test]
async fn test_cancelled_aggregation_returns_promptly_and_caches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_file(dir.path(), "base.yaml", &proxies_yaml(&["base-node"]));
    let healthy = start_mock_source(MockResponse::yaml(&proxies_yaml(&["ok-node"]))).await;
    let stalled = start_stalled_source().await;

    let config = server_config(
        &base,
        vec![
            addition(healthy.url("/"), "Healthy", &[]),
            addition(stalled.url("/"), "Stalled", &[]),
        ],
    );
    let service = SubscriptionService::new(&config, None).unwrap();

    let started = std::time::Instant::now();
    let outcome = tokio::time::timeout(Duration::from_millis(300), service.get_dependencies()).await;
    assert!(outcome.is_err());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(stalled.hits(), 1);

    let again = tokio::time::timeout(Duration::from_millis(300), service.get_dependencies()).await;
    assert!(again.is_err());
    assert_eq!(healthy.hits(), 2);
    assert_eq!(stalled.hits(), 2);
}
