//! CLI argument parsing and resolved runtime configuration (spec.md §6).

use clap::Parser;
use ringcache_core::config::Defaults;
use ringcache_core::hash_ring::RingConfig;
use std::time::Duration;

/// `ringcache-node <request-endpoint> <publish-endpoint> <api-endpoint> [--node <peer>]`
#[derive(Debug, Parser)]
#[command(name = "ringcache-node", about = "Peer-to-peer distributed in-memory cache node")]
pub struct NodeArgs {
    /// Endpoint peers use to send this node Request-protocol messages, e.g. `tcp://0.0.0.0:7000`.
    pub request_endpoint: String,
    /// Endpoint this node publishes its membership view on, e.g. `tcp://0.0.0.0:7001`.
    pub publish_endpoint: String,
    /// Endpoint clients use to talk to this node, e.g. `tcp://0.0.0.0:7002`.
    pub api_endpoint: String,
    /// An existing peer's request endpoint to hand-shake with before entering the loop.
    #[arg(long = "node", value_name = "PEER_REQUEST_ENDPOINT")]
    pub bootstrap_peer: Option<String>,
    /// Log verbosity, passed straight to `tracing_subscriber::EnvFilter`.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// `ringcache-client <api-endpoint> <key> [--set <value>]`
#[derive(Debug, Parser)]
#[command(name = "ringcache-client", about = "Synchronous request/reply client for a ringcache node")]
pub struct ClientArgs {
    /// The node's API endpoint, e.g. `tcp://127.0.0.1:7002`.
    pub api_endpoint: String,
    /// The key to operate on. `status` is a reserved key that requests the diagnostic snapshot.
    pub key: String,
    /// Perform a `set` with this value instead of a `get`.
    #[arg(long)]
    pub set: Option<String>,
}

/// Fully resolved runtime configuration for a [`crate::server::Server`].
///
/// Positional CLI arguments populate the transport endpoints; every other
/// field is a tunable defaulted from [`Defaults`], matching spec.md §6.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub request_endpoint: String,
    pub publish_endpoint: String,
    pub api_endpoint: String,
    pub bootstrap_peer: Option<String>,
    pub ring: RingConfig,
    pub max_size: usize,
    pub timeout: Duration,
    pub pub_interval: Duration,
    pub io_timeout: Duration,
}

impl NodeConfig {
    /// Build config for the given endpoints with every other tunable at its default.
    pub fn new(request_endpoint: String, publish_endpoint: String, api_endpoint: String) -> Self {
        Self {
            request_endpoint,
            publish_endpoint,
            api_endpoint,
            bootstrap_peer: None,
            ring: RingConfig::default(),
            max_size: Defaults::MAX_SIZE,
            timeout: Defaults::TIMEOUT,
            pub_interval: Defaults::PUB_INTERVAL,
            io_timeout: Defaults::IO_TIMEOUT,
        }
    }
}

impl From<NodeArgs> for NodeConfig {
    fn from(args: NodeArgs) -> Self {
        Self {
            bootstrap_peer: args.bootstrap_peer,
            ..Self::new(args.request_endpoint, args.publish_endpoint, args.api_endpoint)
        }
    }
}
