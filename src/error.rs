use std::time::Duration;
use thiserror::Error;

use crate::chord::id::Identifier;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("RPC to {addr} timed out after {after:?}")]
    Timeout { addr: String, after: Duration },

    #[error("gRPC error: {0}")]
    Grpc(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChordError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// The predecessor search ran out of hops before converging.
    #[error("Routing to {target} failed after {hops} hops")]
    RoutingFailure { target: Identifier, hops: usize },

    #[error("Failed to join ring: {0}")]
    JoinFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Identifier {claimed} does not match hash of address {address}")]
    IdentifierMismatch { address: String, claimed: Identifier },

    #[error("Key {key} is outside this node's range")]
    NotOwner { key: Identifier },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ChordError {
    /// Transient failures are logged and retried by the next stabilization tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChordError::Network(_))
    }
}
