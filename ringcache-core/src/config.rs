//! Default tunables, per spec.md §6 "Defaults".

use std::time::Duration;

/// Default tunables for a node. All are overridable via `NodeConfig` in the
/// `ringcache` crate; these are the values the reference implementation ships.
pub struct Defaults;

impl Defaults {
    /// Virtual points per node, per redundancy ring.
    pub const VIRTUAL_POINTS: usize = 5;
    /// Number of redundancy rings (replication factor).
    pub const REDUNDANCY: usize = 3;
    /// Dead-peer threshold.
    pub const TIMEOUT: Duration = Duration::from_secs(12);
    /// Membership publish interval; also the poll timeout.
    pub const PUB_INTERVAL: Duration = Duration::from_secs(5);
    /// Per-request socket I/O timeout.
    pub const IO_TIMEOUT: Duration = Duration::from_secs(5);
    /// Cache capacity in bytes.
    pub const MAX_SIZE: usize = 1024 * 1024;
}
