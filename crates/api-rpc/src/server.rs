//! JSON-RPC Server
//!
//! Implements the JSON-RPC 2.0 server over TCP on localhost.

use crate::handler::{RpcDeps, RpcHandler};
use crate::types::{EnqueueRequest, IntegrationRequest, ResultsRequest};
use conduit_core::domain::TaskEnvelope;
use conduit_core::error::{AppError, Result};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

// Note: jsonrpsee doesn't support Unix sockets directly (hyper limitation)
// Using TCP on localhost as secure alternative (no external access)
pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9627;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 200;
pub const DEFAULT_RATE_LIMIT_RATE: u32 = 100;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit_burst: u32,
    pub rate_limit_rate: u32,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            rate_limit_rate: DEFAULT_RATE_LIMIT_RATE,
        }
    }
}

/// Running server: bound address plus the handle used to stop it
pub struct StartedServer {
    pub local_addr: SocketAddr,
    pub handle: ServerHandle,
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, deps: RpcDeps) -> Self {
        let handler = RpcHandler::new(deps, config.rate_limit_burst, config.rate_limit_rate);
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Start the JSON-RPC server
    ///
    /// Port 0 binds an ephemeral port; see `StartedServer::local_addr`.
    pub async fn start(self) -> Result<StartedServer> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting JSON-RPC server on TCP"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| AppError::Config(format!("Failed to build server on {}: {}", addr, e)))?;
        let local_addr = server.local_addr()?;

        let module = self.module()?;
        let handle = server.start(module);

        info!(addr = %local_addr, "JSON-RPC server started successfully");
        Ok(StartedServer { local_addr, handle })
    }

    fn module(&self) -> Result<RpcModule<()>> {
        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("bridge.dispatch.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let envelope: TaskEnvelope = params.parse()?;
                    handler.dispatch(envelope).await
                }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method("bridge.submit.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let envelope: TaskEnvelope = params.parse()?;
                    handler.submit(envelope).await
                }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method("bridge.results.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    // Parameters are optional
                    let req: ResultsRequest = match params.as_str() {
                        Some(_) => params.parse()?,
                        None => ResultsRequest::default(),
                    };
                    handler.results(req).await
                }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.enqueue.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: EnqueueRequest = params.parse()?;
                    handler.enqueue(req).await
                }
            })
            .map_err(register_error)?;

        // Admin APIs
        let handler = self.handler.clone();
        module
            .register_async_method("admin.stats.v1", move |_, _, _| {
                let handler = handler.clone();
                async move { handler.stats().await }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method("admin.integration.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: IntegrationRequest = params.parse()?;
                    handler.set_integration(req).await
                }
            })
            .map_err(register_error)?;

        Ok(module)
    }
}

fn register_error(e: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("Failed to register RPC method: {}", e))
}
