pub mod client;
pub mod server;
pub mod thread;

use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::{Code, Status};

use crate::chord::id::Identifier;
use crate::chord::ChordConfig;
use crate::error::{ChordError, NetworkError};

#[derive(Clone, Debug)]
pub struct PeerConfig {
    /// Host the node binds to and advertises as `host:port`.
    pub host: String,
    pub grpc_port: Option<u16>, // Optional gRPC port (random if not specified)
    pub chord: ChordConfig,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            grpc_port: None,
            chord: ChordConfig::default(),
        }
    }
}

// Carry a routing failure's details so the caller can rebuild it
const ROUTING_TARGET_KEY: &str = "chord-routing-target";
const ROUTING_HOPS_KEY: &str = "chord-routing-hops";

fn routing_status(message: String, target: &Identifier, hops: usize) -> Status {
    let mut metadata = MetadataMap::new();
    if let Ok(value) = hex::encode(target.to_bytes()).parse::<AsciiMetadataValue>() {
        metadata.insert(ROUTING_TARGET_KEY, value);
    }
    if let Ok(value) = hops.to_string().parse::<AsciiMetadataValue>() {
        metadata.insert(ROUTING_HOPS_KEY, value);
    }
    Status::with_metadata(Code::Aborted, message, metadata)
}

fn routing_failure(status: &Status) -> Option<ChordError> {
    let metadata = status.metadata();
    let target = metadata.get(ROUTING_TARGET_KEY)?.to_str().ok()?;
    let target = Identifier::from_be_slice(&hex::decode(target).ok()?).ok()?;
    let hops = metadata.get(ROUTING_HOPS_KEY)?.to_str().ok()?.parse().ok()?;
    Some(ChordError::RoutingFailure { target, hops })
}

/// Server side: core errors to status codes.
pub fn error_to_status(err: ChordError) -> Status {
    let message = err.to_string();
    match err {
        ChordError::InvalidRequest(_) | ChordError::IdentifierMismatch { .. } => {
            Status::invalid_argument(message)
        }
        ChordError::NotOwner { .. } => Status::failed_precondition(message),
        ChordError::RoutingFailure { target, hops } => routing_status(message, &target, hops),
        ChordError::Network(_) => Status::unavailable(message),
        ChordError::JoinFailed(_) | ChordError::InvalidConfig(_) => Status::internal(message),
    }
}

/// Client side: a failed call to `addr`. Rejected requests and routing failures
/// keep their meaning; anything else counts as a network failure.
pub fn status_to_error(addr: &str, status: Status) -> ChordError {
    if status.code() == Code::Aborted {
        if let Some(err) = routing_failure(&status) {
            return err;
        }
    }
    match status.code() {
        Code::InvalidArgument => ChordError::InvalidRequest(status.message().to_string()),
        Code::Unavailable | Code::Unknown | Code::Cancelled | Code::DeadlineExceeded => {
            NetworkError::PeerUnreachable(format!("{}: {}", addr, status.message())).into()
        }
        code => NetworkError::Grpc(format!("{} returned {:?}: {}", addr, code, status.message()))
            .into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_requests_keep_their_meaning_across_the_wire() {
        let status = error_to_status(ChordError::InvalidRequest("missing field `index`".into()));
        assert_eq!(status.code(), Code::InvalidArgument);
        assert!(matches!(
            status_to_error("peer:1", status),
            ChordError::InvalidRequest(msg) if msg.contains("index")
        ));
    }

    #[test]
    fn routing_failures_survive_the_wire() {
        let routing = ChordError::RoutingFailure {
            target: Identifier::from_u64(9),
            hops: 12,
        };
        let status = error_to_status(routing.clone());
        assert_eq!(status.code(), Code::Aborted);

        let decoded = status_to_error("peer:1", status);
        assert_eq!(decoded, routing);
        assert!(!decoded.is_transient());
    }

    #[test]
    fn remote_failures_become_network_errors() {
        assert!(status_to_error("peer:1", Status::unavailable("refused")).is_transient());
        assert!(status_to_error("peer:1", Status::internal("boom")).is_transient());
        // An abort without routing details is only a failed call
        assert!(status_to_error("peer:1", Status::aborted("gone")).is_transient());
    }
}
