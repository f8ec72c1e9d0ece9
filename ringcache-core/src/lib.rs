//! Sans-IO core of a peer-to-peer distributed in-memory cache node.
//!
//! This crate owns every piece of logic that does not touch a socket:
//! consistent-hash key placement ([`hash_ring`]), the bounded LRU-by-timestamp
//! store ([`cache`]), cluster membership bookkeeping ([`membership`]), the
//! wire protocol framing ([`protocol`]), and outstanding-request correlation
//! ([`pending`]). The `ringcache` crate wires these into an event loop backed
//! by a real transport.

pub mod cache;
pub mod config;
pub mod error;
pub mod hash_ring;
pub mod membership;
pub mod node_id;
pub mod pending;
pub mod protocol;
pub mod time;

pub use cache::Cache;
pub use config::Defaults;
pub use error::{CacheError, ProtocolError};
pub use hash_ring::{HashRing, MembershipChange, RingConfig};
pub use membership::{Membership, PeerEntry, PeerRow, RebalancePlan, RebalanceSend};
pub use node_id::NodeId;
pub use pending::{PendingRequests, RequestId};
