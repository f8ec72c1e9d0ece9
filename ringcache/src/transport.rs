//! Socket plumbing built on the vendored `monocoque` ZMTP sockets.
//!
//! `ringcache-core` is sans-IO; everything in this module bridges its types
//! to real connections. Every accepted or dialed connection gets its own
//! lightweight pump task (spawned on the `compio` runtime) that only moves
//! frames across `flume` channels — it never touches `Server` state, so the
//! single-threaded-owner invariant of spec.md §5 holds even though several
//! tasks are cooperatively scheduled. This generalizes the two-socket
//! `select!` multiplexing in `monocoque_zmtp::proxy::proxy` to N connections
//! funneling into one channel, the same shape as `monocoque_core::pubsub::hub`'s
//! `PubSubHub` (actors push `PubSubEvent`s into one `hub_rx`).

use crate::server::Event;
use bytes::Bytes;
use monocoque::zmq::{DealerSocket, RouterSocket, SubSocket};
use monocoque_core::endpoint::Endpoint;
use ringcache_core::pending::RequestId;
use ringcache_core::protocol;
use ringcache_core::NodeId;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;

/// One inbound message off a ROUTER-facing listener, with the means to reply
/// on the same connection it arrived on.
///
/// `header` is the transport-supplied identity frame that precedes the
/// versioned payload (spec.md §4.4 "header frames"); callers copy it
/// verbatim onto the reply.
pub struct InboundFrame {
    pub header: Bytes,
    pub frames: Vec<Bytes>,
    pub reply_tx: flume::Sender<Vec<Bytes>>,
}

/// Everything the event loop needs to talk to one known peer: an outbound
/// channel to its request-facing DEALER connection, and the FIFO of request
/// IDs awaiting a reply on it.
///
/// The wire protocol carries no request-correlation frame (spec.md §4.4), so
/// correlation relies on TCP/ZMTP's per-connection ordering: replies arrive
/// in the order their requests were sent, so a plain FIFO is exact even with
/// several requests pipelined ahead of their replies.
pub struct PeerHandle {
    pub outbound_tx: flume::Sender<Vec<Bytes>>,
    pub pending: RefCell<VecDeque<RequestId>>,
}

/// Parse a transport URI (`tcp://host:port` or a bare `host:port`) into a
/// `SocketAddr`, the same fallback `DealerSocket::connect` uses internally.
pub fn resolve_tcp_addr(s: &str) -> io::Result<SocketAddr> {
    if let Ok(Endpoint::Tcp(addr)) = Endpoint::parse(s) {
        return Ok(addr);
    }
    s.parse::<SocketAddr>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// Accept connections forever, spawning a [`connection_pump`] for each one.
pub(crate) async fn accept_loop(
    listener: compio::net::TcpListener,
    wrap: fn(InboundFrame) -> Event,
    tx: flume::Sender<Event>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => match RouterSocket::from_tcp(stream).await {
                Ok(router) => {
                    compio::runtime::spawn(connection_pump(router, wrap, tx.clone())).detach();
                }
                Err(e) => tracing::warn!(%addr, error = %e, "rejecting connection: ZMTP handshake failed"),
            },
            Err(e) => {
                tracing::error!(error = %e, "listener accept failed, no longer accepting");
                break;
            }
        }
    }
}

/// Pump one accepted ROUTER connection: forward inbound frames (minus the
/// leading identity header) onto `tx`, and forward anything handed back on
/// the per-connection reply channel onto the socket.
async fn connection_pump(
    mut router: RouterSocket,
    wrap: fn(InboundFrame) -> Event,
    tx: flume::Sender<Event>,
) {
    use futures::{select, FutureExt};

    let (reply_tx, reply_rx) = flume::unbounded::<Vec<Bytes>>();
    loop {
        select! {
            msg = router.recv().fuse() => {
                match msg {
                    Some(mut frames) if !frames.is_empty() => {
                        let header = frames.remove(0);
                        let event = wrap(InboundFrame { header, frames, reply_tx: reply_tx.clone() });
                        if tx.send_async(event).await.is_err() {
                            break;
                        }
                    }
                    Some(_) => continue,
                    None => break,
                }
            }
            outgoing = reply_rx.recv_async().fuse() => {
                match outgoing {
                    Ok(frames) => {
                        if router.send(frames).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        }
    }
}

/// Dial a newly-known peer: open its request-facing DEALER connection and
/// subscribe to its publish topic, spawning a pump task for each. Returns the
/// handle [`ringcache_core::membership::Membership::register`]/`update` store
/// in the peer table.
pub(crate) async fn dial_peer(
    req_address: &str,
    pub_address: &str,
    events_tx: flume::Sender<Event>,
    peer_id: NodeId,
) -> io::Result<PeerHandle> {
    let dealer = DealerSocket::connect(req_address).await?;
    let handle = spawn_peer_pumps(peer_id, dealer, events_tx.clone());
    // Detached: a peer we just learned about may not be accepting publish
    // subscribers yet (its own bootstrap handshake may still be pending on
    // our reply), so this must not block whatever is waiting on `dial_peer`
    // to return.
    let pub_address = pub_address.to_string();
    compio::runtime::spawn(async move { spawn_subscriber(peer_id, &pub_address, events_tx).await }).detach();
    Ok(handle)
}

/// Spawn the dealer pump for an already-connected peer socket (used by the
/// bootstrap handshake, which already holds a live connection from its
/// one-shot `connect` round trip and would otherwise dial twice).
pub(crate) fn spawn_peer_pumps(
    peer_id: NodeId,
    dealer: DealerSocket,
    events_tx: flume::Sender<Event>,
) -> PeerHandle {
    let (outbound_tx, outbound_rx) = flume::unbounded();
    compio::runtime::spawn(peer_dealer_pump(peer_id, dealer, outbound_rx, events_tx)).detach();
    PeerHandle { outbound_tx, pending: RefCell::new(VecDeque::new()) }
}

pub(crate) async fn spawn_subscriber(peer_id: NodeId, pub_address: &str, events_tx: flume::Sender<Event>) {
    match SubSocket::connect(pub_address).await {
        Ok(mut sub) => {
            if let Err(e) = sub.subscribe(protocol::PUBLISH_TOPIC).await {
                tracing::warn!(peer = %peer_id, error = %e, "failed to subscribe to peer publish topic");
                return;
            }
            compio::runtime::spawn(peer_sub_pump(sub, events_tx)).detach();
        }
        Err(e) => tracing::warn!(peer = %peer_id, error = %e, "could not connect to peer publish socket"),
    }
}

async fn peer_dealer_pump(
    peer_id: NodeId,
    mut dealer: DealerSocket,
    outbound_rx: flume::Receiver<Vec<Bytes>>,
    events_tx: flume::Sender<Event>,
) {
    use futures::{select, FutureExt};
    loop {
        select! {
            outgoing = outbound_rx.recv_async().fuse() => {
                match outgoing {
                    Ok(frames) => if dealer.send(frames).await.is_err() { break },
                    Err(_) => break,
                }
            }
            reply = dealer.recv().fuse() => {
                match reply {
                    Some(frames) => {
                        if events_tx.send_async(Event::PeerReply { peer: peer_id, frames }).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
    tracing::debug!(peer = %peer_id, "peer request connection closed");
}

async fn peer_sub_pump(mut sub: SubSocket, events_tx: flume::Sender<Event>) {
    loop {
        match sub.recv().await {
            Ok(Some(frames)) => {
                if events_tx.send_async(Event::Publish { frames }).await.is_err() {
                    break;
                }
            }
            Ok(None) | Err(_) => break,
        }
    }
}
