//! chainql-evm: EVM JSON-RPC data source for the ChainQL interpreter.

pub mod client;
pub mod connector;
pub mod convert;
pub mod rpc;

pub use client::{EvmSourceConfig, JsonRpcChainSource};
pub use connector::EvmConnector;
