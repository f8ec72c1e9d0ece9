//! ZeroMQ security mechanisms
//!
//! Implements authentication and encryption per RFC 23 (PLAIN) and RFC 26 (CURVE).

pub mod zap;
pub mod plain;
pub mod curve;
pub mod zap_handler;
pub mod zap_client;

pub use zap::{ZapMechanism, ZapRequest, ZapResponse, ZapStatus, ZAP_ENDPOINT, ZAP_VERSION};
pub use plain::{PlainAuthHandler, PlainCredentials, StaticPlainHandler};
pub use zap_handler::{DefaultZapHandler, ZapHandler, ZapServer, spawn_zap_server, start_default_zap_server};
pub use zap_client::ZapClient;
pub use curve::{CurveKeyPair, CurvePublicKey, CurveSecretKey};

