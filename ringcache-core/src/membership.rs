//! Cluster membership: who is known, when they were last seen, and the ring
//! view derived from that knowledge (spec.md §4.3).

use crate::hash_ring::{HashRing, MembershipChange, RingConfig};
use crate::node_id::NodeId;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// One known peer. `handle` is whatever the transport layer needs to reach
/// it (in `ringcache` this is the outbound request socket plus subscriber
/// pump); `ringcache-core` only needs to move it around and hand it back on
/// eviction for the caller to close.
pub struct PeerEntry<H> {
    pub node_id: NodeId,
    pub req_address: String,
    pub pub_address: String,
    pub last_seen: DateTime<Utc>,
    pub handle: H,
}

/// One row of an incoming publish/gossip table (spec.md §4.4 Publish protocol).
#[derive(Debug, Clone)]
pub struct PeerRow {
    pub node_id: NodeId,
    pub req_address: String,
    pub pub_address: String,
    pub last_seen: DateTime<Utc>,
}

/// One item this node must send to a newly-owning peer during rebalance.
#[derive(Debug, Clone)]
pub struct RebalanceSend {
    pub target: NodeId,
    pub key: Bytes,
}

/// Outcome of [`Membership::redistribute`] for the local cache as a whole.
#[derive(Debug, Clone, Default)]
pub struct RebalancePlan {
    /// `(peer, key)` pairs to send a peer `set` for.
    pub sends: Vec<RebalanceSend>,
    /// Keys this node no longer owns and should delete once sent.
    pub drop_keys: Vec<Bytes>,
}

/// Tracks peers and the ring built from them plus the local node.
pub struct Membership<H> {
    self_id: NodeId,
    self_req: String,
    self_pub: String,
    timeout: Duration,
    peers: HashMap<NodeId, PeerEntry<H>>,
    ring: HashRing,
}

impl<H> Membership<H> {
    /// Build membership state for a fresh node with no known peers.
    pub fn new(
        self_id: NodeId,
        self_req: impl Into<String>,
        self_pub: impl Into<String>,
        timeout: Duration,
        ring_config: RingConfig,
    ) -> Self {
        Self {
            self_id,
            self_req: self_req.into(),
            self_pub: self_pub.into(),
            timeout,
            peers: HashMap::new(),
            ring: HashRing::new(self_id, ring_config),
        }
    }

    pub fn self_id(&self) -> NodeId {
        self.self_id
    }

    pub fn self_req_address(&self) -> &str {
        &self.self_req
    }

    pub fn self_pub_address(&self) -> &str {
        &self.self_pub
    }

    pub fn ring(&self) -> &HashRing {
        &self.ring
    }

    pub fn peer(&self, id: NodeId) -> Option<&PeerEntry<H>> {
        self.peers.get(&id)
    }

    pub fn peer_mut(&mut self, id: NodeId) -> Option<&mut PeerEntry<H>> {
        self.peers.get_mut(&id)
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerEntry<H>> {
        self.peers.values()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn address_in_use(&self, req: &str, pub_addr: &str) -> bool {
        if req == self.self_req || pub_addr == self.self_pub {
            return true;
        }
        self.peers
            .values()
            .any(|p| p.req_address == req || p.pub_address == pub_addr)
    }

    /// Apply an incoming membership table. For each row, skipping self:
    /// unknown IDs whose addresses are not already in use are registered
    /// (via `make_socket`) and added to the ring; known IDs have `last_seen`
    /// advanced only if the incoming value is later. A row whose addresses
    /// collide with an existing peer (even under a new ID) is dropped —
    /// treated as the same node reborn, until the old entry times out.
    ///
    /// Returns the IDs that were newly registered.
    pub fn update(
        &mut self,
        rows: &[PeerRow],
        mut make_socket: impl FnMut(NodeId, &str, &str) -> H,
    ) -> Vec<NodeId> {
        let mut added = Vec::new();
        for row in rows {
            if row.node_id == self.self_id {
                continue;
            }
            if let Some(existing) = self.peers.get_mut(&row.node_id) {
                if row.last_seen > existing.last_seen {
                    existing.last_seen = row.last_seen;
                }
                continue;
            }
            if self.address_in_use(&row.req_address, &row.pub_address) {
                continue;
            }
            let handle = make_socket(row.node_id, &row.req_address, &row.pub_address);
            self.peers.insert(
                row.node_id,
                PeerEntry {
                    node_id: row.node_id,
                    req_address: row.req_address.clone(),
                    pub_address: row.pub_address.clone(),
                    last_seen: row.last_seen,
                    handle,
                },
            );
            self.ring.add_node(row.node_id);
            tracing::debug!(peer = %row.node_id, "registered peer from publish");
            added.push(row.node_id);
        }
        added
    }

    /// Directly register a peer outside of a publish round (used by the
    /// `connect` handshake, spec.md §4.6). Returns `false` (no-op) if the ID
    /// or addresses are already taken.
    pub fn register(
        &mut self,
        id: NodeId,
        req_address: impl Into<String>,
        pub_address: impl Into<String>,
        now: DateTime<Utc>,
        make_socket: impl FnOnce(NodeId, &str, &str) -> H,
    ) -> bool {
        let req_address = req_address.into();
        let pub_address = pub_address.into();
        if id == self.self_id || self.peers.contains_key(&id) {
            return false;
        }
        if self.address_in_use(&req_address, &pub_address) {
            return false;
        }
        let handle = make_socket(id, &req_address, &pub_address);
        self.peers.insert(
            id,
            PeerEntry { node_id: id, req_address, pub_address, last_seen: now, handle },
        );
        self.ring.add_node(id);
        true
    }

    /// Remove every peer whose `last_seen` is older than `timeout`, dropping
    /// it from the ring and table. Returns the removed handles for closing.
    pub fn sweep_dead(&mut self, now: DateTime<Utc>) -> Vec<(NodeId, H)> {
        let timeout = chrono::Duration::from_std(self.timeout).unwrap_or(chrono::Duration::MAX);
        let dead: Vec<NodeId> = self
            .peers
            .iter()
            .filter(|(_, p)| now.signed_duration_since(p.last_seen) > timeout)
            .map(|(id, _)| *id)
            .collect();

        let mut removed = Vec::with_capacity(dead.len());
        for id in dead {
            if let Some(entry) = self.peers.remove(&id) {
                self.ring.remove_node(id);
                tracing::info!(peer = %id, "evicted peer after timeout");
                removed.push((id, entry.handle));
            }
        }
        removed
    }

    /// Build the full `(id, req, pub, last_seen)` table for a publish,
    /// including the local node's own entry at the tail with `last_seen = now`.
    pub fn publish_rows(&self, now: DateTime<Utc>) -> Vec<PeerRow> {
        let mut rows: Vec<PeerRow> = self
            .peers
            .values()
            .map(|p| PeerRow {
                node_id: p.node_id,
                req_address: p.req_address.clone(),
                pub_address: p.pub_address.clone(),
                last_seen: p.last_seen,
            })
            .collect();
        rows.push(PeerRow {
            node_id: self.self_id,
            req_address: self.self_req.clone(),
            pub_address: self.self_pub.clone(),
            last_seen: now,
        });
        rows
    }

    /// Compute the rebalance plan for a just-applied set of ring changes
    /// (spec.md §4.6 rebalance algorithm). `changes` must describe exactly
    /// the deltas already applied to `self.ring()` — the previous-ring
    /// reconstruction is only correct when all of `changes` were applied in
    /// one step (documented precondition, spec.md §9).
    pub fn redistribute<'a>(
        &self,
        items: impl Iterator<Item = (&'a Bytes, f64)>,
        changes: &[MembershipChange],
    ) -> RebalancePlan {
        let previous = self.ring.reconstruct_previous(changes);
        let mut plan = RebalancePlan::default();

        for (key, hash_index) in items {
            let old_owners = previous.owners(hash_index);
            let new_owners = self.ring.owners(hash_index);

            let was_owner = old_owners.contains(&self.self_id);
            let is_owner = new_owners.contains(&self.self_id);

            for target in new_owners.difference(&old_owners) {
                if *target != self.self_id {
                    plan.sends.push(RebalanceSend { target: *target, key: key.clone() });
                }
            }

            if was_owner && !is_owner {
                plan.drop_keys.push(key.clone());
            }
        }

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn new_membership() -> Membership<u32> {
        Membership::new(
            NodeId::generate(),
            "tcp://node-self-req",
            "tcp://node-self-pub",
            Duration::from_secs(12),
            RingConfig::default(),
        )
    }

    #[test]
    fn update_skips_self() {
        let mut m = new_membership();
        let rows = vec![PeerRow {
            node_id: m.self_id(),
            req_address: "tcp://x".into(),
            pub_address: "tcp://y".into(),
            last_seen: ts(1),
        }];
        let added = m.update(&rows, |_, _, _| 0u32);
        assert!(added.is_empty());
        assert_eq!(m.peer_count(), 0);
    }

    #[test]
    fn update_registers_new_peer_and_advances_ring() {
        let mut m = new_membership();
        let peer_id = NodeId::generate();
        let rows = vec![PeerRow {
            node_id: peer_id,
            req_address: "tcp://a".into(),
            pub_address: "tcp://b".into(),
            last_seen: ts(1),
        }];
        let added = m.update(&rows, |_, _, _| 7u32);
        assert_eq!(added, vec![peer_id]);
        assert_eq!(m.peer_count(), 1);
        assert_eq!(m.ring().node_count(), 2);
    }

    #[test]
    fn update_is_idempotent_except_last_seen() {
        let mut m = new_membership();
        let peer_id = NodeId::generate();
        let rows = vec![PeerRow {
            node_id: peer_id,
            req_address: "tcp://a".into(),
            pub_address: "tcp://b".into(),
            last_seen: ts(1),
        }];
        m.update(&rows, |_, _, _| 0u32);
        let added_again = m.update(&rows, |_, _, _| 0u32);
        assert!(added_again.is_empty());
        assert_eq!(m.peer_count(), 1);
        assert_eq!(m.peer(peer_id).unwrap().last_seen, ts(1));
    }

    #[test]
    fn update_rejects_reused_endpoints_under_new_id() {
        let mut m = new_membership();
        let first = NodeId::generate();
        m.update(
            &[PeerRow {
                node_id: first,
                req_address: "tcp://a".into(),
                pub_address: "tcp://b".into(),
                last_seen: ts(1),
            }],
            |_, _, _| 0u32,
        );
        let second = NodeId::generate();
        let added = m.update(
            &[PeerRow {
                node_id: second,
                req_address: "tcp://a".into(),
                pub_address: "tcp://b".into(),
                last_seen: ts(2),
            }],
            |_, _, _| 0u32,
        );
        assert!(added.is_empty());
        assert_eq!(m.peer_count(), 1);
        assert!(m.peer(first).is_some());
    }

    #[test]
    fn sweep_dead_removes_timed_out_peer_from_ring_and_table() {
        let mut m = new_membership();
        let peer_id = NodeId::generate();
        m.update(
            &[PeerRow {
                node_id: peer_id,
                req_address: "tcp://a".into(),
                pub_address: "tcp://b".into(),
                last_seen: ts(0),
            }],
            |_, _, _| 0u32,
        );
        assert_eq!(m.ring().node_count(), 2);
        let removed = m.sweep_dead(ts(100));
        assert_eq!(removed.len(), 1);
        assert_eq!(m.peer_count(), 0);
        assert_eq!(m.ring().node_count(), 1);
    }

    #[test]
    fn publish_round_trip_no_ring_change_on_receiver() {
        // Node X's table containing Y; Y applies it via update() and, since Y
        // skips its own row, no ring change happens on Y for that row.
        let mut y = new_membership();
        let rows = vec![PeerRow {
            node_id: y.self_id(),
            req_address: y.self_req_address().to_string(),
            pub_address: y.self_pub_address().to_string(),
            last_seen: ts(5),
        }];
        let before = y.ring().node_count();
        let added = y.update(&rows, |_, _, _| 0u32);
        assert!(added.is_empty());
        assert_eq!(y.ring().node_count(), before);
    }
}
