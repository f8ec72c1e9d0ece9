//! Real-socket end-to-end tests against the full [`ringcache::Server`] loop.
//!
//! These spin up actual `compio` runtimes, TCP listeners and ZMTP sockets, the
//! same thing `monocoque`'s own `tests/interop_*.rs` do — and like those, they
//! are `#[ignore]`d: a `compio` runtime juggling several of its own background
//! tasks does not reliably tear down inside the default test harness. Run them
//! explicitly with `cargo test -- --ignored`.

use bytes::Bytes;
use monocoque::zmq::DealerSocket;
use portpicker::pick_unused_port;
use ringcache::{NodeConfig, Server};
use ringcache_core::protocol::{ErrorCode, VERSION};
use std::time::Duration;

fn tcp_endpoint() -> String {
    format!("tcp://127.0.0.1:{}", pick_unused_port().expect("no free port"))
}

async fn request(api_endpoint: &str, frames: Vec<Bytes>) -> Vec<Bytes> {
    let mut dealer = DealerSocket::connect(api_endpoint).await.expect("connect to api endpoint");
    dealer.send(frames).await.expect("send request");
    compio::time::timeout(Duration::from_secs(5), dealer.recv())
        .await
        .expect("reply within timeout")
        .expect("node closed connection")
}

#[test]
#[ignore = "compio runtime lifecycle issues in test harness"]
fn single_node_get_set_roundtrip() {
    compio::runtime::Runtime::new().unwrap().block_on(async {
        let config = NodeConfig::new(tcp_endpoint(), tcp_endpoint(), tcp_endpoint());
        let api_endpoint = config.api_endpoint.clone();
        let server = Server::bind(config).await.unwrap();
        compio::runtime::spawn(async move { server.run().await }).detach();

        let miss = request(
            &api_endpoint,
            vec![Bytes::from_static(VERSION), Bytes::from_static(b"get"), Bytes::from_static(b"k")],
        )
        .await;
        assert_eq!(ErrorCode::from_bytes(&miss[0]), Some(ErrorCode::Ok));
        assert_eq!(miss.get(1).map(|b| b.as_ref()), Some(&b""[..]));

        let set_reply = request(
            &api_endpoint,
            vec![
                Bytes::from_static(VERSION),
                Bytes::from_static(b"set"),
                Bytes::from_static(b"k"),
                Bytes::from_static(b"v"),
            ],
        )
        .await;
        assert_eq!(ErrorCode::from_bytes(&set_reply[0]), Some(ErrorCode::Ok));

        let get_reply = request(
            &api_endpoint,
            vec![Bytes::from_static(VERSION), Bytes::from_static(b"get"), Bytes::from_static(b"k")],
        )
        .await;
        assert_eq!(ErrorCode::from_bytes(&get_reply[0]), Some(ErrorCode::Ok));
        assert_eq!(get_reply.get(1).map(|b| b.as_ref()), Some(&b"v"[..]));
    });
}

#[test]
#[ignore = "compio runtime lifecycle issues in test harness"]
fn status_reports_cache_occupancy() {
    compio::runtime::Runtime::new().unwrap().block_on(async {
        let config = NodeConfig::new(tcp_endpoint(), tcp_endpoint(), tcp_endpoint());
        let api_endpoint = config.api_endpoint.clone();
        let server = Server::bind(config).await.unwrap();
        compio::runtime::spawn(async move { server.run().await }).detach();

        request(
            &api_endpoint,
            vec![
                Bytes::from_static(VERSION),
                Bytes::from_static(b"set"),
                Bytes::from_static(b"k"),
                Bytes::from_static(b"value"),
            ],
        )
        .await;

        let reply =
            request(&api_endpoint, vec![Bytes::from_static(VERSION), Bytes::from_static(b"status")]).await;
        assert_eq!(ErrorCode::from_bytes(&reply[0]), Some(ErrorCode::Ok));
        let body = String::from_utf8(reply[1].to_vec()).unwrap();
        assert!(body.contains("entries=1"), "status body was:\n{body}");
        assert!(body.contains("peer_count=0"), "status body was:\n{body}");
    });
}

#[test]
#[ignore = "compio runtime lifecycle issues in test harness"]
fn two_node_cluster_serves_keys_regardless_of_entry_point() {
    compio::runtime::Runtime::new().unwrap().block_on(async {
        let config_a = NodeConfig::new(tcp_endpoint(), tcp_endpoint(), tcp_endpoint());
        let api_a = config_a.api_endpoint.clone();
        let request_a = config_a.request_endpoint.clone();
        let server_a = Server::bind(config_a).await.unwrap();
        compio::runtime::spawn(async move { server_a.run().await }).detach();

        // Give node A's accept loops a moment to start listening.
        compio::time::sleep(Duration::from_millis(50)).await;

        let mut config_b = NodeConfig::new(tcp_endpoint(), tcp_endpoint(), tcp_endpoint());
        let api_b = config_b.api_endpoint.clone();
        config_b.bootstrap_peer = Some(request_a);
        let server_b = Server::bind(config_b).await.unwrap();
        compio::runtime::spawn(async move { server_b.run().await }).detach();

        // Let both sides finish registering each other and subscribing to
        // one another's publish feed.
        compio::time::sleep(Duration::from_millis(200)).await;

        let set_reply = request(
            &api_a,
            vec![
                Bytes::from_static(VERSION),
                Bytes::from_static(b"set"),
                Bytes::from_static(b"shared-key"),
                Bytes::from_static(b"shared-value"),
            ],
        )
        .await;
        assert_eq!(ErrorCode::from_bytes(&set_reply[0]), Some(ErrorCode::Ok));

        // Whichever node actually owns the key, node B's fan-out must find it.
        let get_reply = request(
            &api_b,
            vec![Bytes::from_static(VERSION), Bytes::from_static(b"get"), Bytes::from_static(b"shared-key")],
        )
        .await;
        assert_eq!(ErrorCode::from_bytes(&get_reply[0]), Some(ErrorCode::Ok));
        assert_eq!(get_reply.get(1).map(|b| b.as_ref()), Some(&b"shared-value"[..]));
    });
}
