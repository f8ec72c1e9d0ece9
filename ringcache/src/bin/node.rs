//! `ringcache-node` — runs a single cache node until killed.

use clap::Parser;
use ringcache::{NodeArgs, NodeConfig, Server};

#[compio::main]
async fn main() -> std::io::Result<()> {
    let args = NodeArgs::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(args.log_level.clone()))
        .init();

    let config = NodeConfig::from(args);
    let (request, publish, api) =
        (config.request_endpoint.clone(), config.publish_endpoint.clone(), config.api_endpoint.clone());
    let server = Server::bind(config).await?;

    println!("ringcache node {} listening", server.id());
    println!("  request: {request}");
    println!("  publish: {publish}");
    println!("  api:     {api}");

    server.run().await
}
