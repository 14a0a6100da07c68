pub mod chord;
pub mod error;
pub mod network;
