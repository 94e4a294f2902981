//! Solana RPC implementation of the chain-data collaborator.

pub mod rpc;

pub use rpc::RpcChainSource;
