//! The `status` API op's diagnostic snapshot (spec.md §4.4, supplemented per
//! the original reference implementation's CLI, see SPEC_FULL.md).

use crate::server::Server;
use bytes::Bytes;
use std::fmt::Write as _;

/// Render a human-readable snapshot: node id, peer count, active/configured
/// redundancy, entry count, utilization percentage, then one summary line
/// per known peer.
pub fn snapshot(server: &Server) -> Bytes {
    let membership = server.membership();
    let cache = server.cache();
    let ring = membership.ring();

    let utilization = if cache.max_size() == 0 {
        0.0
    } else {
        100.0 * cache.size() as f64 / cache.max_size() as f64
    };

    let mut out = String::new();
    let _ = writeln!(out, "node_id={}", membership.self_id());
    let _ = writeln!(out, "uptime_secs={}", (chrono::Utc::now() - server.started_at()).num_seconds());
    let _ = writeln!(out, "peer_count={}", membership.peer_count());
    let _ = writeln!(out, "ring_nodes={} active_rings={}", ring.node_count(), ring.active_rings());
    let _ = writeln!(
        out,
        "entries={} size_bytes={} max_size_bytes={} utilization_pct={:.2}",
        cache.len(),
        cache.size(),
        cache.max_size(),
        utilization
    );
    for peer in membership.peers() {
        let _ = writeln!(
            out,
            "peer id={} req={} pub={} last_seen={}",
            peer.node_id, peer.req_address, peer.pub_address, peer.last_seen
        );
    }

    Bytes::from(out)
}
