use ringcache::{NodeArgs, NodeConfig};
use ringcache_core::config::Defaults;

fn args(bootstrap_peer: Option<&str>) -> NodeArgs {
    NodeArgs {
        request_endpoint: "tcp://127.0.0.1:7000".into(),
        publish_endpoint: "tcp://127.0.0.1:7001".into(),
        api_endpoint: "tcp://127.0.0.1:7002".into(),
        bootstrap_peer: bootstrap_peer.map(String::from),
        log_level: "info".into(),
    }
}

#[test]
fn resolves_transport_endpoints_from_positional_args() {
    let config = NodeConfig::from(args(None));
    assert_eq!(config.request_endpoint, "tcp://127.0.0.1:7000");
    assert_eq!(config.publish_endpoint, "tcp://127.0.0.1:7001");
    assert_eq!(config.api_endpoint, "tcp://127.0.0.1:7002");
    assert!(config.bootstrap_peer.is_none());
}

#[test]
fn carries_bootstrap_peer_through_when_given() {
    let config = NodeConfig::from(args(Some("tcp://127.0.0.1:9000")));
    assert_eq!(config.bootstrap_peer.as_deref(), Some("tcp://127.0.0.1:9000"));
}

#[test]
fn every_other_tunable_comes_from_defaults() {
    let config = NodeConfig::from(args(None));
    assert_eq!(config.max_size, Defaults::MAX_SIZE);
    assert_eq!(config.timeout, Defaults::TIMEOUT);
    assert_eq!(config.pub_interval, Defaults::PUB_INTERVAL);
    assert_eq!(config.io_timeout, Defaults::IO_TIMEOUT);
    assert_eq!(config.ring.virtual_points, Defaults::VIRTUAL_POINTS);
    assert_eq!(config.ring.redundancy, Defaults::REDUNDANCY);
}

#[test]
fn new_builds_the_same_defaults_directly() {
    let config = NodeConfig::new(
        "tcp://127.0.0.1:7000".into(),
        "tcp://127.0.0.1:7001".into(),
        "tcp://127.0.0.1:7002".into(),
    );
    assert!(config.bootstrap_peer.is_none());
    assert_eq!(config.max_size, Defaults::MAX_SIZE);
}
