//! Node runtime for the peer-to-peer distributed in-memory cache (spec.md).
//!
//! `ringcache-core` holds every sans-IO rule; this crate wires it to real
//! sockets (built on the vendored `monocoque` ZMTP stack) behind one
//! single-threaded event loop, see [`server::Server`].

pub mod config;
mod server;
mod status;
mod transport;

pub use config::{ClientArgs, NodeArgs, NodeConfig};
pub use server::Server;
