use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::chord::node::{ChordNode, Membership};
use crate::chord::workers::run_stabilize_worker;
use crate::error::{ChordError, NetworkError};
use crate::network::grpc::client::GrpcTransport;
use crate::network::grpc::thread::GrpcThread;
use crate::network::grpc::PeerConfig;
use crate::network::transport::ChordTransport;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// One running node: a gRPC server for its inbound operations plus the
/// stabilization worker, both on the current tokio runtime.
pub struct ChordPeer {
    node: Arc<ChordNode>,
    port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
    grpc_handle: Option<JoinHandle<Result<(), NetworkError>>>, // Store gRPC server handle
    worker_handle: Option<JoinHandle<()>>,
}

impl ChordPeer {
    /// Binds the listener and starts serving straight away, so peers can reach
    /// the node while it joins. The node starts out as a ring of one.
    pub async fn new(config: PeerConfig) -> Result<Self, ChordError> {
        let bind_addr = format!("{}:{}", config.host, config.grpc_port.unwrap_or(0));
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            NetworkError::ConnectionFailed(format!("Failed to bind {}: {}", bind_addr, e))
        })?;
        let port = listener
            .local_addr()
            .map_err(|e| NetworkError::ConnectionFailed(format!("Listener has no address: {}", e)))?
            .port();

        let address = format!("{}:{}", config.host, port);
        let transport: Arc<dyn ChordTransport> =
            Arc::new(GrpcTransport::new(config.chord.rpc_timeout()));
        let node = ChordNode::bootstrap(address, config.chord, transport)?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let grpc_thread = GrpcThread::new(node.clone(), listener, shutdown_rx);
        let grpc_handle = tokio::spawn(grpc_thread.run());

        Ok(Self {
            node,
            port,
            shutdown_tx: Some(shutdown_tx),
            grpc_handle: Some(grpc_handle),
            worker_handle: None,
        })
    }

    pub fn node(&self) -> &Arc<ChordNode> {
        &self.node
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn address(&self) -> &str {
        self.node.address()
    }

    /// Stays a ring of one and starts maintenance.
    pub async fn create_network(&mut self) -> Result<(), ChordError> {
        info!("Creating new Chord network at {}", self.node.descriptor());
        self.start_workers();
        Ok(())
    }

    pub async fn join(&mut self, bootstrap_addr: &str) -> Result<(), ChordError> {
        info!("Attempting to join network through {}", bootstrap_addr);
        if let Err(e) = self.node.join(bootstrap_addr).await {
            error!("Failed to join through {}: {}", bootstrap_addr, e);
            return Err(e);
        }
        info!("Successfully joined Chord network");
        self.start_workers();
        Ok(())
    }

    pub async fn start(&mut self, membership: Membership) -> Result<(), ChordError> {
        match membership {
            Membership::Bootstrap => self.create_network().await,
            Membership::Join { via } => self.join(&via).await,
        }
    }

    fn start_workers(&mut self) {
        if self.worker_handle.is_none() {
            self.worker_handle = Some(tokio::spawn(run_stabilize_worker(self.node.clone())));
        }
    }

    /// Serves until Ctrl-C, then shuts down.
    pub async fn run(&mut self) -> Result<(), ChordError> {
        info!("Node {} running", self.node.descriptor());
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Received shutdown signal");
        self.shutdown().await
    }

    /// Stops the worker and the gRPC server. Safe to call more than once.
    pub async fn shutdown(&mut self) -> Result<(), ChordError> {
        if let Some(worker) = self.worker_handle.take() {
            worker.abort();
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut handle) = self.grpc_handle.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
                Ok(Ok(result)) => result?,
                Ok(Err(e)) => {
                    return Err(NetworkError::Grpc(format!("gRPC task failed: {}", e)).into())
                }
                Err(_) => {
                    warn!("gRPC server did not drain within {:?}, aborting", SHUTDOWN_GRACE);
                    handle.abort();
                }
            }
        }
        info!("Node {} shut down", self.node.descriptor());
        Ok(())
    }
}

impl Drop for ChordPeer {
    fn drop(&mut self) {
        if let Some(worker) = self.worker_handle.take() {
            worker.abort();
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
