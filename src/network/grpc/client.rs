use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Response, Status};

use crate::chord::id::Identifier;
use crate::chord::types::{FingerUpdate, Key, NodeDescriptor, Value};
use crate::error::{ChordError, NetworkError};
use crate::network::grpc::status_to_error;
use crate::network::messages::chord::{
    chord_node_client::ChordNodeClient, ClosestPrecedingFingerRequest, FindPredecessorRequest,
    FindSuccessorRequest, GetKeyRequest, GetNodeIdRequest, GetPredecessorRequest,
    GetSuccessorRequest, NotifyRequest, NodeInfo, PutKeyRequest, TransferKeysRequest,
    UpdateFingerTableRequest,
};
use crate::network::messages::conversions::{optional_node, required_node};
use crate::network::transport::ChordTransport;

/// Awaits one RPC under `limit`, turning both timeouts and error statuses into [`ChordError`].
async fn call<T>(
    addr: &str,
    limit: Duration,
    request: impl Future<Output = Result<Response<T>, Status>>,
) -> Result<T, ChordError> {
    match tokio::time::timeout(limit, request).await {
        Ok(Ok(response)) => Ok(response.into_inner()),
        Ok(Err(status)) => Err(status_to_error(addr, status)),
        Err(_) => Err(NetworkError::Timeout {
            addr: addr.to_string(),
            after: limit,
        }
        .into()),
    }
}

fn reply_node(info: Option<NodeInfo>, field: &str) -> Result<NodeDescriptor, ChordError> {
    required_node(info, field).map_err(|e| NetworkError::Grpc(format!("bad reply: {}", e)).into())
}

/// Nothing touches the network until the first call on the channel. Request
/// deadlines are enforced per call by [`call`], not by the channel.
fn lazy_channel(addr: &str, timeout: Duration) -> Result<Channel, NetworkError> {
    Ok(Endpoint::from_shared(format!("http://{}", addr))
        .map_err(|e| NetworkError::ConnectionFailed(format!("Invalid address {}: {}", addr, e)))?
        .connect_timeout(timeout)
        .connect_lazy())
}

/// A client for one peer. Cheap to create from a shared [`Channel`].
pub struct ChordGrpcClient {
    client: ChordNodeClient<Channel>,
    addr: String,
    timeout: Duration,
}

impl ChordGrpcClient {
    pub fn from_channel(addr: &str, channel: Channel, timeout: Duration) -> Self {
        Self {
            client: ChordNodeClient::new(channel),
            addr: addr.to_string(),
            timeout,
        }
    }

    pub async fn get_node_id(&mut self) -> Result<Identifier, ChordError> {
        let response = call(
            &self.addr,
            self.timeout,
            self.client.get_node_id(GetNodeIdRequest {}),
        )
        .await?;
        Identifier::from_be_slice(&response.node_id)
    }

    pub async fn get_successor(&mut self) -> Result<NodeDescriptor, ChordError> {
        let response = call(
            &self.addr,
            self.timeout,
            self.client.get_successor(GetSuccessorRequest {}),
        )
        .await?;
        reply_node(response.successor, "successor")
    }

    pub async fn get_predecessor(&mut self) -> Result<Option<NodeDescriptor>, ChordError> {
        let response = call(
            &self.addr,
            self.timeout,
            self.client.get_predecessor(GetPredecessorRequest {}),
        )
        .await?;
        optional_node(response.predecessor)
    }

    pub async fn find_successor(&mut self, id: Identifier) -> Result<NodeDescriptor, ChordError> {
        let response = call(
            &self.addr,
            self.timeout,
            self.client.find_successor(FindSuccessorRequest {
                id: id.to_bytes().to_vec(),
            }),
        )
        .await?;
        reply_node(response.successor, "successor")
    }

    pub async fn find_predecessor(&mut self, id: Identifier) -> Result<NodeDescriptor, ChordError> {
        let response = call(
            &self.addr,
            self.timeout,
            self.client.find_predecessor(FindPredecessorRequest {
                id: id.to_bytes().to_vec(),
            }),
        )
        .await?;
        reply_node(response.predecessor, "predecessor")
    }

    pub async fn closest_preceding_finger(
        &mut self,
        id: Identifier,
    ) -> Result<NodeDescriptor, ChordError> {
        let response = call(
            &self.addr,
            self.timeout,
            self.client
                .closest_preceding_finger(ClosestPrecedingFingerRequest {
                    id: id.to_bytes().to_vec(),
                }),
        )
        .await?;
        reply_node(response.node, "node")
    }

    pub async fn notify(&mut self, candidate: &NodeDescriptor) -> Result<bool, ChordError> {
        let response = call(
            &self.addr,
            self.timeout,
            self.client.notify(NotifyRequest {
                candidate: Some(candidate.into()),
            }),
        )
        .await?;
        Ok(response.accepted)
    }

    pub async fn update_finger_table(
        &mut self,
        candidate: &NodeDescriptor,
        index: usize,
    ) -> Result<FingerUpdate, ChordError> {
        let index = u32::try_from(index)
            .map_err(|_| ChordError::InvalidRequest(format!("finger index {} too large", index)))?;
        let response = call(
            &self.addr,
            self.timeout,
            self.client.update_finger_table(UpdateFingerTableRequest {
                candidate: Some(candidate.into()),
                index: Some(index),
            }),
        )
        .await?;
        Ok(FingerUpdate {
            updated: response.updated,
            predecessor: optional_node(response.predecessor)?,
        })
    }

    pub async fn get_key(&mut self, key: &Key) -> Result<Option<Value>, ChordError> {
        let request = self.client.get_key(GetKeyRequest { key: key.0.clone() });
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => Ok(Some(Value(response.into_inner().value))),
            Ok(Err(status)) if status.code() == Code::NotFound => Ok(None),
            Ok(Err(status)) => Err(status_to_error(&self.addr, status)),
            Err(_) => Err(NetworkError::Timeout {
                addr: self.addr.clone(),
                after: self.timeout,
            }
            .into()),
        }
    }

    pub async fn put_key(&mut self, key: Key, value: Value) -> Result<(), ChordError> {
        call(
            &self.addr,
            self.timeout,
            self.client.put_key(PutKeyRequest {
                key: key.0,
                value: value.0,
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn transfer_keys(
        &mut self,
        node: &NodeDescriptor,
        predecessor: Option<&NodeDescriptor>,
    ) -> Result<Vec<(Key, Value)>, ChordError> {
        let response = call(
            &self.addr,
            self.timeout,
            self.client.transfer_keys(TransferKeysRequest {
                node: Some(node.into()),
                predecessor: predecessor.map(NodeInfo::from),
            }),
        )
        .await?;
        Ok(response.data.into_iter().map(Into::into).collect())
    }
}

/// [`ChordTransport`] over gRPC, keeping one channel per peer address.
pub struct GrpcTransport {
    channels: Mutex<HashMap<String, Channel>>,
    timeout: Duration,
}

impl GrpcTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub async fn client(&self, addr: &str) -> Result<ChordGrpcClient, ChordError> {
        let mut channels = self.channels.lock().await;
        let channel = match channels.get(addr) {
            Some(channel) => channel.clone(),
            None => {
                let channel = lazy_channel(addr, self.timeout)?;
                channels.insert(addr.to_string(), channel.clone());
                channel
            }
        };
        Ok(ChordGrpcClient::from_channel(addr, channel, self.timeout))
    }
}

#[async_trait]
impl ChordTransport for GrpcTransport {
    async fn get_node_id(&self, addr: &str) -> Result<Identifier, ChordError> {
        self.client(addr).await?.get_node_id().await
    }

    async fn get_successor(&self, addr: &str) -> Result<NodeDescriptor, ChordError> {
        self.client(addr).await?.get_successor().await
    }

    async fn get_predecessor(&self, addr: &str) -> Result<Option<NodeDescriptor>, ChordError> {
        self.client(addr).await?.get_predecessor().await
    }

    async fn find_successor(
        &self,
        addr: &str,
        id: Identifier,
    ) -> Result<NodeDescriptor, ChordError> {
        self.client(addr).await?.find_successor(id).await
    }

    async fn find_predecessor(
        &self,
        addr: &str,
        id: Identifier,
    ) -> Result<NodeDescriptor, ChordError> {
        self.client(addr).await?.find_predecessor(id).await
    }

    async fn closest_preceding_finger(
        &self,
        addr: &str,
        id: Identifier,
    ) -> Result<NodeDescriptor, ChordError> {
        self.client(addr).await?.closest_preceding_finger(id).await
    }

    async fn notify(&self, addr: &str, candidate: &NodeDescriptor) -> Result<bool, ChordError> {
        self.client(addr).await?.notify(candidate).await
    }

    async fn update_finger_table(
        &self,
        addr: &str,
        candidate: &NodeDescriptor,
        index: usize,
    ) -> Result<FingerUpdate, ChordError> {
        self.client(addr)
            .await?
            .update_finger_table(candidate, index)
            .await
    }

    async fn get_key(&self, addr: &str, key: &Key) -> Result<Option<Value>, ChordError> {
        self.client(addr).await?.get_key(key).await
    }

    async fn put_key(&self, addr: &str, key: Key, value: Value) -> Result<(), ChordError> {
        self.client(addr).await?.put_key(key, value).await
    }

    async fn transfer_keys(
        &self,
        addr: &str,
        node: &NodeDescriptor,
        predecessor: Option<&NodeDescriptor>,
    ) -> Result<Vec<(Key, Value)>, ChordError> {
        self.client(addr)
            .await?
            .transfer_keys(node, predecessor)
            .await
    }
}
