use crate::chord::id::Identifier;
use crate::chord::types::{Key, NodeDescriptor, Value};
use crate::error::ChordError;
use crate::network::messages::chord::{KeyValue, NodeInfo};

impl From<&NodeDescriptor> for NodeInfo {
    fn from(node: &NodeDescriptor) -> Self {
        NodeInfo {
            node_id: node.id.to_bytes().to_vec(),
            address: node.address.clone(),
        }
    }
}

impl TryFrom<NodeInfo> for NodeDescriptor {
    type Error = ChordError;

    fn try_from(info: NodeInfo) -> Result<Self, Self::Error> {
        if info.address.is_empty() {
            return Err(ChordError::InvalidRequest("node address is empty".into()));
        }
        Ok(NodeDescriptor {
            id: Identifier::from_be_slice(&info.node_id)?,
            address: info.address,
        })
    }
}

/// Decodes a required descriptor field, naming it in the error when absent.
pub fn required_node(info: Option<NodeInfo>, field: &str) -> Result<NodeDescriptor, ChordError> {
    info.ok_or_else(|| ChordError::InvalidRequest(format!("missing field `{}`", field)))?
        .try_into()
}

pub fn optional_node(info: Option<NodeInfo>) -> Result<Option<NodeDescriptor>, ChordError> {
    info.map(NodeDescriptor::try_from).transpose()
}

impl From<(Key, Value)> for KeyValue {
    fn from((key, value): (Key, Value)) -> Self {
        KeyValue {
            key: key.0,
            value: value.0,
        }
    }
}

impl From<KeyValue> for (Key, Value) {
    fn from(kv: KeyValue) -> Self {
        (Key(kv.key), Value(kv.value))
    }
}
