//! JSON-RPC API Layer
//!
//! Implements the JSON-RPC 2.0 server through which hosts hand commands and
//! push items to the Conduit bridge.

pub mod error;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod types;

pub use handler::{RpcDeps, RpcHandler};
pub use server::{RpcServer, RpcServerConfig, StartedServer};
