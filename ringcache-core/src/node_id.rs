//! Opaque node identity (spec.md §3 "Node identity").

use std::fmt;

/// A 128-bit opaque identifier, uniquely generated when a node starts up.
///
/// `NodeId` is never derived from an address: two nodes sharing an endpoint
/// after a restart get distinct IDs, which is exactly the case
/// [`crate::membership::Membership::update`] needs to tell apart a genuine
/// rejoin from a reused endpoint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId([u8; 16]);

impl NodeId {
    /// Generate a fresh, random node ID.
    pub fn generate() -> Self {
        Self(rand::random())
    }

    /// Build a `NodeId` from raw bytes (used when parsing wire frames).
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw bytes of this ID.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Render as a lowercase hex string, the form used on the wire.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// Parse a lowercase hex string produced by [`NodeId::to_hex`].
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 16] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.to_hex())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_hex() {
        let id = NodeId::generate();
        let hex = id.to_hex();
        assert_eq!(NodeId::from_hex(&hex), Some(id));
    }

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(NodeId::generate(), NodeId::generate());
    }
}
