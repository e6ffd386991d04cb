//! Tests for upstream normalization and round-robin selection.

use ginx::config::{Config, ServerConfig};
use ginx::proxy::backend::{Backend, BackendPool, PoolError};

fn config_with(load_balancer: &str, upstreams: Vec<String>) -> Config {
    Config {
        server: ServerConfig {
            address: String::new(),
            port: 8080,
            async_method: "epoll".to_string(),
            load_balancer: load_balancer.to_string(),
            upstream_servers: upstreams,
        },
    }
}

#[test]
fn test_backend_from_url_with_explicit_port() {
    let backend = Backend::from_url("http://10.0.0.1:8080").unwrap();
    assert_eq!(backend.authority(), "10.0.0.1:8080");
    assert_eq!(backend.addr().to_string(), "10.0.0.1:8080");
}

#[test]
fn test_backend_from_url_without_scheme() {
    let backend = Backend::from_url("10.0.0.1:9000").unwrap();
    assert_eq!(backend.authority(), "10.0.0.1:9000");
    assert_eq!(backend.addr().port(), 9000);
}

#[test]
fn test_backend_from_url_defaults_http_port() {
    let backend = Backend::from_url("http://10.0.0.1").unwrap();
    assert_eq!(backend.addr().port(), 80);
    // The authority carries a port exactly when the URL did.
    assert_eq!(backend.authority(), "10.0.0.1");
}

#[test]
fn test_backend_from_url_resolves_hostname() {
    let backend = Backend::from_url("http://localhost:9000").unwrap();
    assert_eq!(backend.addr().to_string(), "127.0.0.1:9000");
    assert_eq!(backend.authority(), "127.0.0.1:9000");
}

#[test]
fn test_backend_from_url_rejects_missing_host() {
    assert!(matches!(
        Backend::from_url("http://"),
        Err(PoolError::InvalidUpstream { .. })
    ));
}

#[test]
fn test_backend_from_url_rejects_garbage() {
    assert!(matches!(
        Backend::from_url("http://exa mple/"),
        Err(PoolError::InvalidUpstream { .. })
    ));
}

#[test]
fn test_round_robin_selection_is_modulo() {
    let backends = vec![
        Backend::from_url("http://10.0.0.1:1111").unwrap(),
        Backend::from_url("http://10.0.0.2:2222").unwrap(),
        Backend::from_url("http://10.0.0.3:3333").unwrap(),
    ];
    let mut pool = BackendPool::new(backends.clone());

    for i in 0..7 {
        let selected = pool.select().unwrap();
        assert_eq!(selected, backends[i % 3], "selection {i} broke rotation");
    }
}

#[test]
fn test_round_robin_single_backend() {
    let backend = Backend::from_url("http://10.0.0.1:1111").unwrap();
    let mut pool = BackendPool::new(vec![backend.clone()]);

    assert_eq!(pool.select().unwrap(), backend);
    assert_eq!(pool.select().unwrap(), backend);
}

#[test]
fn test_empty_pool_has_no_upstreams() {
    let mut pool = BackendPool::new(Vec::new());
    assert!(matches!(pool.select(), Err(PoolError::NoUpstreams)));
}

#[test]
fn test_pool_from_config_round_robin() {
    let config = config_with(
        "round_robin",
        vec![
            "http://10.0.0.1:8080".to_string(),
            "10.0.0.2:8081".to_string(),
        ],
    );
    let pool = BackendPool::from_config(&config).unwrap();
    assert_eq!(pool.len(), 2);
}

#[test]
fn test_pool_from_config_rejects_unknown_policy() {
    let config = config_with("least_conn", vec!["http://10.0.0.1:8080".to_string()]);
    match BackendPool::from_config(&config) {
        Err(PoolError::UnsupportedPolicy(name)) => assert_eq!(name, "least_conn"),
        other => panic!("expected UnsupportedPolicy, got {other:?}"),
    }
}

#[test]
fn test_pool_from_config_propagates_bad_upstream() {
    let config = config_with("round_robin", vec!["http://".to_string()]);
    assert!(matches!(
        BackendPool::from_config(&config),
        Err(PoolError::InvalidUpstream { .. })
    ));
}
