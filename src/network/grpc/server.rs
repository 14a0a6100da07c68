use log::debug;
use std::sync::Arc;
use tonic::{Request, Response, Status};

use crate::chord::id::Identifier;
use crate::chord::node::ChordNode;
use crate::chord::types::{Key, Value};
use crate::network::grpc::error_to_status;
use crate::network::messages::chord::{
    chord_node_server::ChordNode as ChordNodeService, ClosestPrecedingFingerRequest,
    ClosestPrecedingFingerResponse, FindPredecessorRequest, FindPredecessorResponse,
    FindSuccessorRequest, FindSuccessorResponse, GetKeyRequest, GetKeyResponse, GetNodeIdRequest,
    GetNodeIdResponse, GetPredecessorRequest, GetPredecessorResponse, GetSuccessorRequest,
    GetSuccessorResponse, KeyValue, NodeInfo, NotifyRequest, NotifyResponse, PutKeyRequest,
    PutKeyResponse, TransferKeysRequest, TransferKeysResponse, UpdateFingerTableRequest,
    UpdateFingerTableResponse,
};
use crate::network::messages::conversions::{optional_node, required_node};

/// Serves one [`ChordNode`]. Every handler decodes and validates its request,
/// then hands off to the node.
#[derive(Clone)]
pub struct ChordGrpcServer {
    node: Arc<ChordNode>,
}

impl ChordGrpcServer {
    pub fn new(node: Arc<ChordNode>) -> Self {
        Self { node }
    }

    /// Decodes an identifier argument and checks it fits the ring.
    fn decode_id(&self, bytes: &[u8]) -> Result<Identifier, Status> {
        let id = Identifier::from_be_slice(bytes).map_err(error_to_status)?;
        if !self.node.space().contains(&id) {
            return Err(Status::invalid_argument(format!(
                "identifier {} is outside the {}-bit ring",
                id,
                self.node.space().bits()
            )));
        }
        Ok(id)
    }
}

#[tonic::async_trait]
impl ChordNodeService for ChordGrpcServer {
    async fn get_node_id(
        &self,
        _request: Request<GetNodeIdRequest>,
    ) -> Result<Response<GetNodeIdResponse>, Status> {
        Ok(Response::new(GetNodeIdResponse {
            node_id: self.node.id().to_bytes().to_vec(),
        }))
    }

    async fn get_successor(
        &self,
        _request: Request<GetSuccessorRequest>,
    ) -> Result<Response<GetSuccessorResponse>, Status> {
        let successor = self.node.successor().await;
        Ok(Response::new(GetSuccessorResponse {
            successor: Some(NodeInfo::from(&successor)),
        }))
    }

    async fn get_predecessor(
        &self,
        _request: Request<GetPredecessorRequest>,
    ) -> Result<Response<GetPredecessorResponse>, Status> {
        let predecessor = self.node.predecessor().await;
        Ok(Response::new(GetPredecessorResponse {
            predecessor: predecessor.as_ref().map(NodeInfo::from),
        }))
    }

    async fn find_successor(
        &self,
        request: Request<FindSuccessorRequest>,
    ) -> Result<Response<FindSuccessorResponse>, Status> {
        let id = self.decode_id(&request.into_inner().id)?;
        debug!("FindSuccessor({}) at {}", id, self.node.descriptor());

        let successor = self.node.find_successor(id).await.map_err(error_to_status)?;
        Ok(Response::new(FindSuccessorResponse {
            successor: Some(NodeInfo::from(&successor)),
        }))
    }

    async fn find_predecessor(
        &self,
        request: Request<FindPredecessorRequest>,
    ) -> Result<Response<FindPredecessorResponse>, Status> {
        let id = self.decode_id(&request.into_inner().id)?;
        debug!("FindPredecessor({}) at {}", id, self.node.descriptor());

        let predecessor = self
            .node
            .find_predecessor(id)
            .await
            .map_err(error_to_status)?;
        Ok(Response::new(FindPredecessorResponse {
            predecessor: Some(NodeInfo::from(&predecessor)),
        }))
    }

    async fn closest_preceding_finger(
        &self,
        request: Request<ClosestPrecedingFingerRequest>,
    ) -> Result<Response<ClosestPrecedingFingerResponse>, Status> {
        let id = self.decode_id(&request.into_inner().id)?;
        let node = self.node.closest_preceding_finger(id).await;
        Ok(Response::new(ClosestPrecedingFingerResponse {
            node: Some(NodeInfo::from(&node)),
        }))
    }

    async fn notify(
        &self,
        request: Request<NotifyRequest>,
    ) -> Result<Response<NotifyResponse>, Status> {
        let candidate =
            required_node(request.into_inner().candidate, "candidate").map_err(error_to_status)?;
        let accepted = self.node.notify(candidate).await.map_err(error_to_status)?;
        Ok(Response::new(NotifyResponse { accepted }))
    }

    async fn update_finger_table(
        &self,
        request: Request<UpdateFingerTableRequest>,
    ) -> Result<Response<UpdateFingerTableResponse>, Status> {
        let req = request.into_inner();
        let index = req
            .index
            .ok_or_else(|| Status::invalid_argument("missing field `index`"))?;
        let candidate = required_node(req.candidate, "candidate").map_err(error_to_status)?;

        let update = self
            .node
            .update_finger_table(candidate, index as usize)
            .await
            .map_err(error_to_status)?;
        Ok(Response::new(UpdateFingerTableResponse {
            updated: update.updated,
            predecessor: update.predecessor.as_ref().map(NodeInfo::from),
        }))
    }

    async fn get_key(
        &self,
        request: Request<GetKeyRequest>,
    ) -> Result<Response<GetKeyResponse>, Status> {
        let key = Key(request.into_inner().key);
        match self.node.get_key(&key).await.map_err(error_to_status)? {
            Some(value) => Ok(Response::new(GetKeyResponse { value: value.0 })),
            None => Err(Status::not_found("Key not found")),
        }
    }

    async fn put_key(
        &self,
        request: Request<PutKeyRequest>,
    ) -> Result<Response<PutKeyResponse>, Status> {
        let req = request.into_inner();
        self.node
            .put_key(Key(req.key), Value(req.value))
            .await
            .map_err(error_to_status)?;
        Ok(Response::new(PutKeyResponse {}))
    }

    async fn transfer_keys(
        &self,
        request: Request<TransferKeysRequest>,
    ) -> Result<Response<TransferKeysResponse>, Status> {
        let req = request.into_inner();
        let node = required_node(req.node, "node").map_err(error_to_status)?;
        let predecessor = optional_node(req.predecessor).map_err(error_to_status)?;

        let pairs = self
            .node
            .transfer_keys(node, predecessor)
            .await
            .map_err(error_to_status)?;
        Ok(Response::new(TransferKeysResponse {
            data: pairs.into_iter().map(KeyValue::from).collect(),
        }))
    }
}
