//! Wire protocol framing (spec.md §4.4).
//!
//! Every message here is a sequence of frames with the transport-supplied
//! identity header frame stripped by the caller before parsing, and
//! re-prepended before the reply is sent — this module only ever
//! sees/produces the frames after that point.

use crate::error::ProtocolError;
use crate::node_id::NodeId;
use crate::membership::PeerRow;
use crate::time::{format_timestamp, parse_timestamp};
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// The only protocol version this node speaks.
pub const VERSION: &[u8] = b"1";

/// Publish-protocol topic byte.
pub const PUBLISH_TOPIC: &[u8] = b"n";

/// Reply error codes (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Ok = 0,
    TooBig = 1,
    Timeout = 2,
    NodeIdTaken = 997,
    UnknownRequest = 998,
    VersionMismatch = 999,
}

impl ErrorCode {
    pub fn as_bytes(self) -> Bytes {
        Bytes::from((self as u16).to_string())
    }

    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        let s = std::str::from_utf8(b).ok()?;
        let code: u16 = s.parse().ok()?;
        Some(match code {
            0 => Self::Ok,
            1 => Self::TooBig,
            2 => Self::Timeout,
            997 => Self::NodeIdTaken,
            998 => Self::UnknownRequest,
            999 => Self::VersionMismatch,
            _ => return None,
        })
    }
}

/// A parsed client request (API protocol).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    Get { key: Bytes },
    Set { key: Bytes, value: Bytes },
    Status,
}

fn check_version(frames: &[Bytes]) -> Result<(), ProtocolError> {
    match frames.first() {
        Some(v) if v.as_ref() == VERSION => Ok(()),
        Some(v) => Err(ProtocolError::VersionMismatch(
            String::from_utf8_lossy(v).into_owned(),
        )),
        None => Err(ProtocolError::Malformed("empty message".into())),
    }
}

fn op_of(frames: &[Bytes]) -> Result<&[u8], ProtocolError> {
    frames
        .get(1)
        .map(|b| b.as_ref())
        .ok_or_else(|| ProtocolError::Malformed("missing op frame".into()))
}

/// Parse `[version, op, ...args]` as an API-protocol request.
pub fn parse_api_request(frames: &[Bytes]) -> Result<ApiRequest, ProtocolError> {
    check_version(frames)?;
    match op_of(frames)? {
        b"get" => {
            let key = frames
                .get(2)
                .cloned()
                .ok_or_else(|| ProtocolError::Malformed("get requires a key".into()))?;
            Ok(ApiRequest::Get { key })
        }
        b"set" => {
            let key = frames
                .get(2)
                .cloned()
                .ok_or_else(|| ProtocolError::Malformed("set requires a key".into()))?;
            let value = frames.get(3).cloned().unwrap_or_default();
            Ok(ApiRequest::Set { key, value })
        }
        b"status" => Ok(ApiRequest::Status),
        other => Err(ProtocolError::UnknownOp(String::from_utf8_lossy(other).into_owned())),
    }
}

/// Build an API-protocol reply payload (caller prepends headers + error code).
pub fn encode_api_reply(code: ErrorCode, mut payload: Vec<Bytes>) -> Vec<Bytes> {
    let mut out = Vec::with_capacity(payload.len() + 1);
    out.push(code.as_bytes());
    out.append(&mut payload);
    out
}

/// A parsed peer-to-peer request (Request protocol).
#[derive(Debug, Clone, PartialEq)]
pub enum PeerRequest {
    Get { key: Bytes },
    Set { key: Bytes, value: Bytes, timestamp: DateTime<Utc> },
    Connect { node_id: NodeId, req_address: String, pub_address: String },
}

/// Parse `[version, op, ...args]` as a Request-protocol message.
pub fn parse_peer_request(frames: &[Bytes]) -> Result<PeerRequest, ProtocolError> {
    check_version(frames)?;
    match op_of(frames)? {
        b"get" => {
            let key = frames
                .get(2)
                .cloned()
                .ok_or_else(|| ProtocolError::Malformed("get requires a key".into()))?;
            Ok(PeerRequest::Get { key })
        }
        b"set" => {
            let key = frames
                .get(2)
                .cloned()
                .ok_or_else(|| ProtocolError::Malformed("set requires a key".into()))?;
            let value = frames
                .get(3)
                .cloned()
                .ok_or_else(|| ProtocolError::Malformed("set requires a value".into()))?;
            let ts_frame = frames
                .get(4)
                .ok_or_else(|| ProtocolError::Malformed("set requires a timestamp".into()))?;
            let ts_str = std::str::from_utf8(ts_frame).map_err(|_| ProtocolError::InvalidUtf8)?;
            let timestamp = parse_timestamp(ts_str)?;
            Ok(PeerRequest::Set { key, value, timestamp })
        }
        b"connect" => {
            let id_frame = frames
                .get(2)
                .ok_or_else(|| ProtocolError::Malformed("connect requires a node id".into()))?;
            let id_str = std::str::from_utf8(id_frame).map_err(|_| ProtocolError::InvalidUtf8)?;
            let node_id = NodeId::from_hex(id_str)
                .ok_or_else(|| ProtocolError::Malformed("invalid node id".into()))?;
            let req_address = frames
                .get(3)
                .ok_or_else(|| ProtocolError::Malformed("connect requires a request address".into()))?;
            let pub_address = frames
                .get(4)
                .ok_or_else(|| ProtocolError::Malformed("connect requires a publish address".into()))?;
            Ok(PeerRequest::Connect {
                node_id,
                req_address: String::from_utf8_lossy(req_address).into_owned(),
                pub_address: String::from_utf8_lossy(pub_address).into_owned(),
            })
        }
        other => Err(ProtocolError::UnknownOp(String::from_utf8_lossy(other).into_owned())),
    }
}

/// Encode a peer `get` reply: `[err, value, timestamp]`.
pub fn encode_peer_get_reply(
    code: ErrorCode,
    value: Bytes,
    timestamp: Option<DateTime<Utc>>,
) -> Vec<Bytes> {
    vec![
        code.as_bytes(),
        value,
        timestamp.map(format_timestamp).unwrap_or_default().into(),
    ]
}

/// Encode a peer `set` reply: `[err]`.
pub fn encode_peer_set_reply(code: ErrorCode) -> Vec<Bytes> {
    vec![code.as_bytes()]
}

/// Encode a successful peer `connect` reply: `[0, node_id, req, pub]`.
pub fn encode_connect_ok(node_id: NodeId, req_address: &str, pub_address: &str) -> Vec<Bytes> {
    vec![
        ErrorCode::Ok.as_bytes(),
        Bytes::from(node_id.to_hex()),
        Bytes::from(req_address.to_string()),
        Bytes::from(pub_address.to_string()),
    ]
}

/// Encode the rejected peer `connect` reply: `[997]`.
pub fn encode_connect_collision() -> Vec<Bytes> {
    vec![ErrorCode::NodeIdTaken.as_bytes()]
}

/// Encode a `connect` peer request (used both by bootstrap and hand-shake fan-out).
pub fn encode_connect_request(node_id: NodeId, req_address: &str, pub_address: &str) -> Vec<Bytes> {
    vec![
        Bytes::from_static(VERSION),
        Bytes::from_static(b"connect"),
        Bytes::from(node_id.to_hex()),
        Bytes::from(req_address.to_string()),
        Bytes::from(pub_address.to_string()),
    ]
}

/// Encode a peer `get` request.
pub fn encode_get_request(key: Bytes) -> Vec<Bytes> {
    vec![Bytes::from_static(VERSION), Bytes::from_static(b"get"), key]
}

/// Encode a peer `set` request.
pub fn encode_set_request(key: Bytes, value: Bytes, timestamp: DateTime<Utc>) -> Vec<Bytes> {
    vec![
        Bytes::from_static(VERSION),
        Bytes::from_static(b"set"),
        key,
        value,
        Bytes::from(format_timestamp(timestamp)),
    ]
}

/// Encode a full membership publish message: `[topic, rows...]`, where `rows`
/// is expected to already carry the publisher's own entry at the tail
/// (see [`crate::membership::Membership::publish_rows`]).
pub fn encode_publish(rows: &[PeerRow]) -> Vec<Bytes> {
    let mut out = Vec::with_capacity(1 + rows.len() * 4);
    out.push(Bytes::from_static(PUBLISH_TOPIC));
    for row in rows {
        out.push(Bytes::from(row.node_id.to_hex()));
        out.push(Bytes::from(row.req_address.clone()));
        out.push(Bytes::from(row.pub_address.clone()));
        out.push(Bytes::from(format_timestamp(row.last_seen)));
    }
    out
}

/// Parse a publish message, returning the rows after the topic frame.
pub fn parse_publish(frames: &[Bytes]) -> Result<Vec<PeerRow>, ProtocolError> {
    match frames.first() {
        Some(t) if t.as_ref() == PUBLISH_TOPIC => {}
        Some(_) => return Err(ProtocolError::Malformed("unexpected publish topic".into())),
        None => return Err(ProtocolError::Malformed("empty publish message".into())),
    }
    let body = &frames[1..];
    if body.len() % 4 != 0 {
        return Err(ProtocolError::Malformed("publish row count not a multiple of 4".into()));
    }
    let mut rows = Vec::with_capacity(body.len() / 4);
    for chunk in body.chunks_exact(4) {
        let id_str = std::str::from_utf8(&chunk[0]).map_err(|_| ProtocolError::InvalidUtf8)?;
        let node_id = NodeId::from_hex(id_str)
            .ok_or_else(|| ProtocolError::Malformed("invalid node id in publish row".into()))?;
        let req_address = String::from_utf8_lossy(&chunk[1]).into_owned();
        let pub_address = String::from_utf8_lossy(&chunk[2]).into_owned();
        let ts_str = std::str::from_utf8(&chunk[3]).map_err(|_| ProtocolError::InvalidUtf8)?;
        let last_seen = parse_timestamp(ts_str)?;
        rows.push(PeerRow { node_id, req_address, pub_address, last_seen });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_get_and_set() {
        let get = parse_api_request(&[
            Bytes::from_static(b"1"),
            Bytes::from_static(b"get"),
            Bytes::from_static(b"k"),
        ])
        .unwrap();
        assert_eq!(get, ApiRequest::Get { key: Bytes::from_static(b"k") });

        let set = parse_api_request(&[
            Bytes::from_static(b"1"),
            Bytes::from_static(b"set"),
            Bytes::from_static(b"k"),
            Bytes::from_static(b"v"),
        ])
        .unwrap();
        assert_eq!(
            set,
            ApiRequest::Set { key: Bytes::from_static(b"k"), value: Bytes::from_static(b"v") }
        );
    }

    #[test]
    fn rejects_version_mismatch() {
        let err = parse_api_request(&[Bytes::from_static(b"2"), Bytes::from_static(b"get")])
            .unwrap_err();
        assert!(matches!(err, ProtocolError::VersionMismatch(_)));
    }

    #[test]
    fn rejects_unknown_op() {
        let err = parse_api_request(&[Bytes::from_static(b"1"), Bytes::from_static(b"frobnicate")])
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownOp(_)));
    }

    #[test]
    fn publish_round_trips() {
        let row = PeerRow {
            node_id: NodeId::generate(),
            req_address: "tcp://a:1".into(),
            pub_address: "tcp://a:2".into(),
            last_seen: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        };
        let frames = encode_publish(std::slice::from_ref(&row));
        let parsed = parse_publish(&frames).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].node_id, row.node_id);
        assert_eq!(parsed[0].last_seen, row.last_seen);
    }

    #[test]
    fn connect_request_round_trips_into_peer_request() {
        let id = NodeId::generate();
        let frames = encode_connect_request(id, "tcp://req", "tcp://pub");
        let parsed = parse_peer_request(&frames).unwrap();
        assert_eq!(
            parsed,
            PeerRequest::Connect {
                node_id: id,
                req_address: "tcp://req".into(),
                pub_address: "tcp://pub".into(),
            }
        );
    }
}
