use crate::chord::node::ChordNode;
use crate::error::NetworkError;
use crate::network::grpc::server::ChordGrpcServer;
use crate::network::messages::chord::chord_node_server::ChordNodeServer;
use futures::FutureExt;
use log::{error, info};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

/// Serves one node's gRPC surface on an already bound listener until shutdown.
pub struct GrpcThread {
    node: Arc<ChordNode>,
    listener: TcpListener,
    shutdown_rx: oneshot::Receiver<()>,
}

impl GrpcThread {
    pub fn new(
        node: Arc<ChordNode>,
        listener: TcpListener,
        shutdown_rx: oneshot::Receiver<()>,
    ) -> Self {
        Self {
            node,
            listener,
            shutdown_rx,
        }
    }

    pub async fn run(self) -> Result<(), NetworkError> {
        let addr = self
            .listener
            .local_addr()
            .map_err(|e| NetworkError::Grpc(format!("Listener has no address: {}", e)))?;

        info!("Starting gRPC server on {}", addr);

        let server = ChordGrpcServer::new(self.node.clone());

        match Server::builder()
            .add_service(ChordNodeServer::new(server))
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(self.listener),
                self.shutdown_rx.map(|_| ()),
            )
            .await
        {
            Ok(_) => {
                info!("gRPC server on {} shut down gracefully", addr);
                Ok(())
            }
            Err(e) => {
                error!("gRPC server encountered a fatal error: {:?}", e);
                Err(NetworkError::Grpc(format!("Server error: {}", e)))
            }
        }
    }
}
