//! Length-prefixed request/reply RPC over TCP.
//!
//! Both processes speak the same symmetric protocol: a 4-byte big-endian
//! length followed by a bincode frame. Calls are multiplexed on one
//! connection by sequence number, so a liveness ping can overtake a slow
//! job listing. Handlers are registered under `Service.Method` names.

pub mod client;
pub mod frame;
pub mod server;
pub mod wire;

pub use client::RpcClient;
pub use server::RpcServer;
