pub mod finger;
pub mod id;
pub mod node;
pub mod routing;
pub mod storage;
pub mod types;
pub mod workers;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::chord::id::IdentifierSpace;
use crate::error::ChordError;

// Chord configuration
pub const DEFAULT_ID_BITS: u32 = 6;
pub const STABILIZE_INTERVAL_MS: u64 = 5_000;
pub const RPC_TIMEOUT_MS: u64 = 3_000;

/// Per-node protocol settings. Every field has a default, so a config file only
/// needs to name what it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChordConfig {
    /// m: the ring holds `2^m` identifiers and each finger table `m` entries.
    pub id_bits: u32,
    pub stabilize_interval_ms: u64,
    pub rpc_timeout_ms: u64,
    /// Hop cap for predecessor searches; `2 * m` when unset.
    pub max_lookup_hops: Option<usize>,
    /// Hop cap for backward finger update propagation; `m` when unset.
    pub max_update_hops: Option<usize>,
    /// Reject GetKey/PutKey for keys outside `(predecessor, self]`.
    pub strict_ownership: bool,
    /// Reject inbound descriptors whose identifier is not the hash of their address.
    pub verify_identifiers: bool,
}

impl Default for ChordConfig {
    fn default() -> Self {
        Self {
            id_bits: DEFAULT_ID_BITS,
            stabilize_interval_ms: STABILIZE_INTERVAL_MS,
            rpc_timeout_ms: RPC_TIMEOUT_MS,
            max_lookup_hops: None,
            max_update_hops: None,
            strict_ownership: false,
            verify_identifiers: true,
        }
    }
}

impl ChordConfig {
    pub fn from_json(json: &str) -> Result<Self, ChordError> {
        let config: ChordConfig = serde_json::from_str(json)
            .map_err(|e| ChordError::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.space()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ChordError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ChordError::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn space(&self) -> Result<IdentifierSpace, ChordError> {
        IdentifierSpace::new(self.id_bits)
    }

    pub fn stabilize_interval(&self) -> Duration {
        Duration::from_millis(self.stabilize_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn lookup_hop_limit(&self) -> usize {
        self.max_lookup_hops
            .unwrap_or(2 * self.id_bits as usize)
            .max(1)
    }

    pub fn update_hop_limit(&self) -> usize {
        self.max_update_hops.unwrap_or(self.id_bits as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ChordConfig::from_json(r#"{ "id_bits": 16, "strict_ownership": true }"#)
            .unwrap();
        assert_eq!(config.id_bits, 16);
        assert!(config.strict_ownership);
        assert_eq!(config.stabilize_interval(), Duration::from_secs(5));
        assert_eq!(config.lookup_hop_limit(), 32);
        assert_eq!(config.update_hop_limit(), 16);
        assert!(config.verify_identifiers);
    }

    #[test]
    fn rejects_invalid_width() {
        assert!(matches!(
            ChordConfig::from_json(r#"{ "id_bits": 300 }"#),
            Err(ChordError::InvalidConfig(_))
        ));
        assert!(ChordConfig::from_json("not json").is_err());
    }
}
