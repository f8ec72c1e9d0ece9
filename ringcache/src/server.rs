//! The single-threaded event loop (spec.md §4.6, §5).
//!
//! One `Server` owns the cache, the membership table and every peer/client
//! connection; nothing here is `Send` and nothing needs to be, because
//! everything funnels through one `futures::select!` loop, the same shape as
//! `monocoque_zmtp::proxy::proxy`'s frontend/backend race generalized to N
//! connections via the `flume`-channel "hub" pattern `monocoque_core`'s
//! `PubSubHub` uses.

use crate::config::NodeConfig;
use crate::status;
use crate::transport::{self, InboundFrame, PeerHandle};
use bytes::Bytes;
use chrono::Utc;
use compio::net::TcpListener;
use futures::{select, FutureExt};
use monocoque::zmq::{DealerSocket, PubSocket};
use ringcache_core::hash_ring::MembershipChange;
use ringcache_core::pending::{PendingRequests, RequestId};
use ringcache_core::protocol::{self, ApiRequest, ErrorCode, PeerRequest};
use ringcache_core::{Cache, Membership, NodeId, ProtocolError};
use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::time::Instant;

/// Everything that can wake the main loop up.
pub(crate) enum Event {
    Api(InboundFrame),
    Peer(InboundFrame),
    PeerReply { peer: NodeId, frames: Vec<Bytes> },
    Publish { frames: Vec<Bytes> },
}

/// A peer `get` fan-out in flight: the first reply wins and cancels the rest;
/// only once every owner has timed out does the client see a timeout reply.
struct GetFan {
    reply_tx: flume::Sender<Vec<Bytes>>,
    header: Bytes,
    answered: bool,
    remaining: usize,
}

/// A peer `set` fan-out in flight: waits for every owner to answer before
/// replying OK/TOO_BIG, unless one times out first (spec.md §4.6) — once
/// `answered` is set, late replies become no-ops instead of re-firing.
struct SetFan {
    reply_tx: flume::Sender<Vec<Bytes>>,
    header: Bytes,
    answered: bool,
    remaining: usize,
    any_too_big: bool,
}

pub struct Server {
    id: NodeId,
    membership: Membership<PeerHandle>,
    cache: Cache,
    pending: PendingRequests<Vec<Bytes>>,
    events_tx: flume::Sender<Event>,
    events_rx: flume::Receiver<Event>,
    publisher: PubSocket,
    config: NodeConfig,
    last_published: Instant,
    started_at: chrono::DateTime<Utc>,
}

impl Server {
    /// Bind the API, Request and Publish listeners and, if `config` names a
    /// bootstrap peer, hand-shake with it before returning.
    pub async fn bind(config: NodeConfig) -> io::Result<Self> {
        let id = NodeId::generate();
        let (events_tx, events_rx) = flume::unbounded();

        let req_addr = transport::resolve_tcp_addr(&config.request_endpoint)?;
        let api_addr = transport::resolve_tcp_addr(&config.api_endpoint)?;
        let pub_addr = transport::resolve_tcp_addr(&config.publish_endpoint)?;

        let req_listener = TcpListener::bind(req_addr).await?;
        let api_listener = TcpListener::bind(api_addr).await?;
        let publisher = PubSocket::bind(pub_addr).await?;

        compio::runtime::spawn(transport::accept_loop(req_listener, Event::Peer, events_tx.clone()))
            .detach();
        compio::runtime::spawn(transport::accept_loop(api_listener, Event::Api, events_tx.clone()))
            .detach();

        let membership = Membership::new(
            id,
            config.request_endpoint.clone(),
            config.publish_endpoint.clone(),
            config.timeout,
            config.ring,
        );

        let mut server = Self {
            id,
            membership,
            cache: Cache::new(config.max_size),
            pending: PendingRequests::new(),
            events_tx,
            events_rx,
            publisher,
            config,
            last_published: Instant::now(),
            started_at: Utc::now(),
        };

        if let Some(peer_addr) = server.config.bootstrap_peer.clone() {
            if let Err(e) = server.bootstrap(&peer_addr).await {
                tracing::warn!(peer = %peer_addr, error = %e, "bootstrap handshake failed, starting solo");
            }
        }

        tracing::info!(
            id = %id,
            request = %server.config.request_endpoint,
            publish = %server.config.publish_endpoint,
            api = %server.config.api_endpoint,
            "node ready"
        );

        Ok(server)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// One-shot handshake with an existing cluster member (spec.md §4.6):
    /// dial its Request endpoint, send `connect`, and on success keep the
    /// same dealer connection as the ongoing peer link instead of dialing
    /// twice.
    async fn bootstrap(&mut self, peer_addr: &str) -> io::Result<()> {
        let mut dealer = DealerSocket::connect(peer_addr).await?;
        let request = protocol::encode_connect_request(
            self.id,
            self.membership.self_req_address(),
            self.membership.self_pub_address(),
        );
        dealer.send(request).await?;

        let reply = compio::time::timeout(self.config.io_timeout, dealer.recv())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "bootstrap connect timed out"))?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed during bootstrap"))?;

        let code = reply
            .first()
            .and_then(|b| ErrorCode::from_bytes(b))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed connect reply"))?;
        if code != ErrorCode::Ok {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "bootstrap peer rejected our node id"));
        }
        let peer_id = reply
            .get(1)
            .and_then(|b| std::str::from_utf8(b).ok())
            .and_then(NodeId::from_hex)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed connect reply node id"))?;
        let peer_req = reply.get(2).map(|b| String::from_utf8_lossy(b).into_owned()).unwrap_or_default();
        let peer_pub = reply.get(3).map(|b| String::from_utf8_lossy(b).into_owned()).unwrap_or_default();

        let handle = transport::spawn_peer_pumps(peer_id, dealer, self.events_tx.clone());
        transport::spawn_subscriber(peer_id, &peer_pub, self.events_tx.clone()).await;

        let now = Utc::now();
        let mut handle = Some(handle);
        self.membership.register(peer_id, peer_req, peer_pub, now, |_, _, _| {
            handle.take().expect("set once")
        });
        Ok(())
    }

    /// Run the node forever: race inbound events, the publish subscriber
    /// accept loop, and the publish-interval timer, running housekeeping
    /// after every iteration (spec.md §4.6).
    pub async fn run(mut self) -> io::Result<()> {
        loop {
            select! {
                event = self.events_rx.recv_async().fuse() => {
                    match event {
                        Ok(event) => self.handle_event(event).await,
                        Err(_) => break,
                    }
                }
                accepted = self.publisher.accept_subscriber().fuse() => {
                    if let Err(e) = accepted {
                        tracing::warn!(error = %e, "failed to accept publish subscriber");
                    }
                }
                _ = compio::time::sleep(self.config.pub_interval).fuse() => {}
            }
            self.housekeeping().await;
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Api(frame) => self.handle_api(frame).await,
            Event::Peer(frame) => self.handle_peer(frame).await,
            Event::PeerReply { peer, frames } => self.handle_peer_reply(peer, frames),
            Event::Publish { frames } => self.handle_publish(frames).await,
        }
    }

    // ---- API protocol (spec.md §4.4, client-facing) ----

    async fn handle_api(&mut self, frame: InboundFrame) {
        let InboundFrame { header, frames, reply_tx } = frame;
        let request = match protocol::parse_api_request(&frames) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(error = %e, "malformed api request");
                let _ = reply_tx.send(reply(header, protocol::encode_api_reply(error_code_for(&e), vec![])));
                return;
            }
        };
        match request {
            ApiRequest::Get { key } => self.handle_api_get(header, key, reply_tx).await,
            ApiRequest::Set { key, value } => self.handle_api_set(header, key, value, reply_tx).await,
            ApiRequest::Status => {
                let snapshot = status::snapshot(self);
                let _ = reply_tx.send(reply(header, protocol::encode_api_reply(ErrorCode::Ok, vec![snapshot])));
            }
        }
    }

    /// Answer a `get` from the local cache if this node is one of `key`'s
    /// owners (a miss still replies here, with an empty value — spec.md §4.6
    /// never fans an owner's own miss out to its sibling owners); otherwise
    /// fan the request out to every owner, where the first reply wins and
    /// cancels its siblings.
    async fn handle_api_get(&mut self, header: Bytes, key: Bytes, reply_tx: flume::Sender<Vec<Bytes>>) {
        let hash_index = ringcache_core::hash_ring::hash_bytes(&key);
        let owners = self.membership.ring().owners(hash_index);

        if owners.contains(&self.id) {
            let (_, value) = self.cache.get(&key);
            let _ = reply_tx.send(reply(
                header,
                protocol::encode_api_reply(ErrorCode::Ok, vec![value.unwrap_or_default()]),
            ));
            return;
        }

        let peer_owners: Vec<NodeId> = owners.into_iter().filter(|id| *id != self.id).collect();
        if peer_owners.is_empty() {
            let _ = reply_tx.send(reply(header, protocol::encode_api_reply(ErrorCode::Ok, vec![Bytes::new()])));
            return;
        }

        let fan = Rc::new(RefCell::new(GetFan {
            reply_tx,
            header,
            answered: false,
            remaining: peer_owners.len(),
        }));
        let deadline = Instant::now() + self.config.io_timeout;
        let ids: Vec<RequestId> = peer_owners.iter().map(|_| RequestId::generate()).collect();
        for (peer, id) in peer_owners.iter().zip(ids.iter()) {
            let fan = fan.clone();
            let siblings: Vec<RequestId> = ids.iter().filter(|i| **i != *id).copied().collect();
            self.pending.register_with_id(*id, deadline, move |response| {
                let mut fan = fan.borrow_mut();
                if fan.answered {
                    return vec![];
                }
                match response {
                    Some(frames) => {
                        fan.answered = true;
                        // peer get reply: [err, value, timestamp]
                        let ok = frames.first().and_then(|b| ErrorCode::from_bytes(b)) == Some(ErrorCode::Ok);
                        let value = if ok { frames.get(1).cloned().unwrap_or_default() } else { Bytes::new() };
                        let payload = protocol::encode_api_reply(ErrorCode::Ok, vec![value]);
                        let _ = fan.reply_tx.send(reply(fan.header.clone(), payload));
                        siblings.clone()
                    }
                    None => {
                        fan.remaining -= 1;
                        if fan.remaining == 0 {
                            fan.answered = true;
                            let payload =
                                protocol::encode_api_reply(ErrorCode::Timeout, vec![Bytes::new()]);
                            let _ = fan.reply_tx.send(reply(fan.header.clone(), payload));
                        }
                        vec![]
                    }
                }
            });
            self.send_peer_request(*peer, *id, protocol::encode_get_request(key.clone()));
        }
    }

    /// Fan a `set` out to every owner of `key`. Per spec.md §4.6, the client
    /// reply waits for *every* owner (including the local apply) to answer —
    /// OK only if every response was `0`, TOO_BIG otherwise — unless one peer
    /// times out first, in which case the reply fires immediately as a
    /// timeout and later replies for this fan-out become no-ops.
    async fn handle_api_set(&mut self, header: Bytes, key: Bytes, value: Bytes, reply_tx: flume::Sender<Vec<Bytes>>) {
        let now = Utc::now();
        let hash_index = ringcache_core::hash_ring::hash_bytes(&key);
        let owners = self.membership.ring().owners(hash_index);

        let mut local_too_big = false;
        if owners.contains(&self.id) {
            if let Err(e) = self.cache.set(key.clone(), value.clone(), now, hash_index) {
                tracing::debug!(error = %e, "local set failed");
                local_too_big = true;
            }
        }

        let peer_owners: Vec<NodeId> = owners.into_iter().filter(|id| *id != self.id).collect();
        if peer_owners.is_empty() {
            let code = if local_too_big { ErrorCode::TooBig } else { ErrorCode::Ok };
            let _ = reply_tx.send(reply(header, protocol::encode_api_reply(code, vec![])));
            return;
        }

        let fan = Rc::new(RefCell::new(SetFan {
            reply_tx,
            header,
            answered: false,
            remaining: peer_owners.len(),
            any_too_big: local_too_big,
        }));
        let deadline = Instant::now() + self.config.io_timeout;
        for peer in peer_owners {
            let id = RequestId::generate();
            let fan = fan.clone();
            self.pending.register_with_id(id, deadline, move |response| {
                let mut fan = fan.borrow_mut();
                if fan.answered {
                    return vec![];
                }
                match response {
                    Some(frames) => {
                        let ok =
                            frames.first().and_then(|b| ErrorCode::from_bytes(b)) == Some(ErrorCode::Ok);
                        if !ok {
                            fan.any_too_big = true;
                        }
                        fan.remaining -= 1;
                        if fan.remaining == 0 {
                            fan.answered = true;
                            let code = if fan.any_too_big { ErrorCode::TooBig } else { ErrorCode::Ok };
                            let _ = fan
                                .reply_tx
                                .send(reply(fan.header.clone(), protocol::encode_api_reply(code, vec![])));
                        }
                    }
                    None => {
                        fan.answered = true;
                        let _ = fan.reply_tx.send(reply(
                            fan.header.clone(),
                            protocol::encode_api_reply(ErrorCode::Timeout, vec![]),
                        ));
                    }
                }
                vec![]
            });
            self.send_peer_request(peer, id, protocol::encode_set_request(key.clone(), value.clone(), now));
        }
    }

    // ---- Request protocol (spec.md §4.4, peer-facing) ----

    async fn handle_peer(&mut self, frame: InboundFrame) {
        let InboundFrame { header, frames, reply_tx } = frame;
        let request = match protocol::parse_peer_request(&frames) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(error = %e, "malformed peer request");
                let _ = reply_tx.send(reply(header, vec![error_code_for(&e).as_bytes()]));
                return;
            }
        };
        match request {
            PeerRequest::Get { key } => {
                let (timestamp, value) = self.cache.get(&key);
                let payload = protocol::encode_peer_get_reply(ErrorCode::Ok, value.unwrap_or_default(), timestamp);
                let _ = reply_tx.send(reply(header, payload));
            }
            PeerRequest::Set { key, value, timestamp } => {
                let hash_index = ringcache_core::hash_ring::hash_bytes(&key);
                let code = match self.cache.set(key, value, timestamp, hash_index) {
                    Ok(()) => ErrorCode::Ok,
                    Err(_) => ErrorCode::TooBig,
                };
                let _ = reply_tx.send(reply(header, protocol::encode_peer_set_reply(code)));
            }
            PeerRequest::Connect { node_id, req_address, pub_address } => {
                let payload = self.handle_peer_connect(node_id, req_address, pub_address).await;
                let _ = reply_tx.send(reply(header, payload));
            }
        }
    }

    async fn handle_peer_connect(&mut self, node_id: NodeId, req_address: String, pub_address: String) -> Vec<Bytes> {
        if node_id == self.id || self.membership.peer(node_id).is_some() {
            return protocol::encode_connect_collision();
        }
        match transport::dial_peer(&req_address, &pub_address, self.events_tx.clone(), node_id).await {
            Ok(handle) => {
                let now = Utc::now();
                let mut handle = Some(handle);
                let ok = self.membership.register(node_id, req_address.clone(), pub_address.clone(), now, |_, _, _| {
                    handle.take().expect("set once")
                });
                if ok {
                    self.run_rebalance(&[MembershipChange::Added(node_id)]);

                    // Re-fan the handshake to every other already-known peer
                    // so the new node propagates through the cluster without
                    // waiting for the next publish tick.
                    let other_peers: Vec<NodeId> =
                        self.membership.peers().map(|p| p.node_id).filter(|id| *id != node_id).collect();
                    for peer in other_peers {
                        let frames = protocol::encode_connect_request(node_id, &req_address, &pub_address);
                        self.send_peer_fire_and_forget(peer, frames);
                    }

                    protocol::encode_connect_ok(self.id, self.membership.self_req_address(), self.membership.self_pub_address())
                } else {
                    protocol::encode_connect_collision()
                }
            }
            Err(e) => {
                tracing::warn!(peer = %node_id, error = %e, "could not dial connecting peer back");
                protocol::encode_connect_collision()
            }
        }
    }

    fn handle_peer_reply(&mut self, peer: NodeId, frames: Vec<Bytes>) {
        let Some(entry) = self.membership.peer(peer) else { return };
        let Some(id) = entry.handle.pending.borrow_mut().pop_front() else {
            tracing::debug!(peer = %peer, "reply with no matching outstanding request");
            return;
        };
        self.pending.resolve(id, frames);
    }

    // ---- Publish protocol (spec.md §4.4, §4.6) ----

    async fn handle_publish(&mut self, frames: Vec<Bytes>) {
        let rows = match protocol::parse_publish(&frames) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::debug!(error = %e, "malformed publish message");
                return;
            }
        };

        let mut handles = std::collections::HashMap::new();
        for row in &rows {
            if row.node_id == self.id || self.membership.peer(row.node_id).is_some() {
                continue;
            }
            if let Ok(handle) =
                transport::dial_peer(&row.req_address, &row.pub_address, self.events_tx.clone(), row.node_id).await
            {
                handles.insert(row.node_id, handle);
            }
        }

        let added = self.membership.update(&rows, |id, _, _| {
            handles.remove(&id).expect("dialed every row passed to update")
        });

        if !added.is_empty() {
            let changes: Vec<MembershipChange> = added.into_iter().map(MembershipChange::Added).collect();
            self.run_rebalance(&changes);
        }
    }

    // ---- housekeeping (spec.md §4.6) ----

    async fn housekeeping(&mut self) {
        self.pending.sweep_timeouts(Instant::now());

        let dead = self.membership.sweep_dead(Utc::now());
        if !dead.is_empty() {
            let changes: Vec<MembershipChange> =
                dead.iter().map(|(id, _)| MembershipChange::Removed(*id)).collect();
            self.run_rebalance(&changes);
        }

        if self.last_published.elapsed() >= self.config.pub_interval {
            self.publish_membership().await;
        }
    }

    async fn publish_membership(&mut self) {
        let rows = self.membership.publish_rows(Utc::now());
        let message = protocol::encode_publish(&rows);
        if let Err(e) = self.publisher.send(message).await {
            tracing::warn!(error = %e, "failed to publish membership");
        }
        self.last_published = Instant::now();
    }

    /// Apply a just-computed rebalance plan: fire-and-forget `set`s for keys
    /// this node gained ownership of responsibility to forward, then drop
    /// the keys it no longer owns.
    fn run_rebalance(&mut self, changes: &[MembershipChange]) {
        let items: Vec<(Bytes, f64)> =
            self.cache.items().map(|(k, entry)| (k.clone(), entry.hash_index)).collect();
        let plan = self
            .membership
            .redistribute(items.iter().map(|(k, h)| (k, *h)), changes);

        for send in &plan.sends {
            let (timestamp, value) = self.cache.get(&send.key);
            let (Some(timestamp), Some(value)) = (timestamp, value) else { continue };
            let frames = protocol::encode_set_request(send.key.clone(), value, timestamp);
            self.send_peer_fire_and_forget(send.target, frames);
        }
        for key in &plan.drop_keys {
            self.cache.remove(key);
        }
    }

    /// Send a Request-protocol message to `peer`, registering the ID in the
    /// pending table under the already-assigned `id` so the caller's fan-out
    /// closure can reference sibling IDs before this call returns.
    fn send_peer_request(&mut self, peer: NodeId, id: RequestId, frames: Vec<Bytes>) {
        let Some(entry) = self.membership.peer(peer) else {
            self.pending.forget(id);
            return;
        };
        entry.handle.pending.borrow_mut().push_back(id);
        if entry.handle.outbound_tx.send(frames).is_err() {
            self.pending.forget(id);
        }
    }

    /// Send a Request-protocol message with no reply correlation (used for
    /// rebalance `set`s, which the receiving peer answers but nobody awaits).
    fn send_peer_fire_and_forget(&mut self, peer: NodeId, frames: Vec<Bytes>) {
        let Some(entry) = self.membership.peer(peer) else { return };
        let id = RequestId::generate();
        entry.handle.pending.borrow_mut().push_back(id);
        self.pending.register_with_id(id, Instant::now() + self.config.timeout, |_response| vec![]);
        let _ = entry.handle.outbound_tx.send(frames);
    }

    pub(crate) fn membership(&self) -> &Membership<PeerHandle> {
        &self.membership
    }

    pub(crate) fn cache(&self) -> &Cache {
        &self.cache
    }

    pub(crate) fn started_at(&self) -> chrono::DateTime<Utc> {
        self.started_at
    }
}

/// Map a parse failure to the wire error code a client/peer should see:
/// version mismatches get their own distinct code (spec.md §4.4/§7), every
/// other parse failure is an opaque "unknown request".
fn error_code_for(e: &ProtocolError) -> ErrorCode {
    match e {
        ProtocolError::VersionMismatch(_) => ErrorCode::VersionMismatch,
        _ => ErrorCode::UnknownRequest,
    }
}

fn reply(header: Bytes, mut payload: Vec<Bytes>) -> Vec<Bytes> {
    let mut out = Vec::with_capacity(payload.len() + 1);
    out.push(header);
    out.append(&mut payload);
    out
}
