//! `ringcache-client` — one-shot get/set/status request against a node's API endpoint.

use bytes::Bytes;
use clap::Parser;
use monocoque::zmq::DealerSocket;
use ringcache::ClientArgs;
use ringcache_core::protocol::{ErrorCode, VERSION};
use std::time::Duration;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

#[compio::main]
async fn main() -> std::io::Result<()> {
    let args = ClientArgs::parse();
    tracing_subscriber::fmt().with_max_level(tracing::Level::WARN).init();

    if let Err(e) = run(args).await {
        eprintln!("ringcache-client: {e}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: ClientArgs) -> std::io::Result<()> {
    let mut dealer = DealerSocket::connect(&args.api_endpoint).await?;

    let request = if args.key == "status" {
        vec![Bytes::from_static(VERSION), Bytes::from_static(b"status")]
    } else if let Some(value) = args.set {
        vec![
            Bytes::from_static(VERSION),
            Bytes::from_static(b"set"),
            Bytes::from(args.key.clone()),
            Bytes::from(value),
        ]
    } else {
        vec![Bytes::from_static(VERSION), Bytes::from_static(b"get"), Bytes::from(args.key.clone())]
    };

    dealer.send(request).await?;
    let reply = compio::time::timeout(IO_TIMEOUT, dealer.recv())
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "node did not reply in time"))?
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "node closed the connection"))?;

    let code = reply
        .first()
        .and_then(|b| ErrorCode::from_bytes(b))
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed reply"))?;

    match code {
        ErrorCode::Ok => {
            if let Some(payload) = reply.get(1) {
                println!("{}", String::from_utf8_lossy(payload));
            }
            Ok(())
        }
        other => {
            eprintln!("node returned error code {other:?}");
            std::process::exit(1)
        }
    }
}

