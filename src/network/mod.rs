pub mod grpc;
pub mod memory;
pub mod messages;
pub mod node;
pub mod transport;
