//! Coordinator process: worker registry, liveness loop, fan-out
//! dispatcher, and the RPC surface workers call back into.

pub mod dispatcher;
pub mod liveness;
pub mod registry;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api;
use crate::archive;
use crate::config::Config;
use crate::coordinator::dispatcher::Dispatcher;
use crate::coordinator::registry::WorkerRegistry;
use crate::error::Result;
use crate::rpc::wire::{
    ClientInfo, RespCommon, METHOD_SERVER_CLIENT_ADD, METHOD_SERVER_CLIENT_PING,
};
use crate::rpc::RpcServer;

/// Everything a coordinator holds, passed explicitly instead of living in
/// process globals so tests can stand up one per case.
pub struct CoordinatorContext {
    pub config: Config,
    pub registry: Arc<WorkerRegistry>,
    pub dispatcher: Dispatcher,
}

impl CoordinatorContext {
    pub fn new(config: Config) -> Arc<Self> {
        let registry = Arc::new(WorkerRegistry::new());
        let archive = archive::from_config(&config.mongo);
        let dispatcher = Dispatcher::new(registry.clone(), archive);
        Arc::new(Self {
            config,
            registry,
            dispatcher,
        })
    }

    /// Start the worker-facing RPC service and the liveness loop, then
    /// serve the operator API until shutdown.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        let listener = RpcServer::bind(&self.config.server.uri).await?;
        tracing::info!(addr = %self.config.server.uri, "coordinator rpc listening");

        let mut server = RpcServer::new();
        self.register_rpc(&mut server);
        tokio::spawn(Arc::new(server).serve(listener, shutdown.clone()));

        tokio::spawn(liveness::run(
            self.registry.clone(),
            self.config.ping_interval(),
            shutdown.clone(),
        ));

        api::serve(self.clone(), shutdown).await
    }

    /// Request logging for the HTTP layer, gated on `api.mode`.
    pub fn trace_api(&self, path: &str) {
        if self.config.api.mode == "debug" {
            tracing::debug!(path, "operator request");
        }
    }

    /// Methods workers call on the coordinator: self-registration and the
    /// reverse-direction liveness probe.
    pub fn register_rpc(&self, server: &mut RpcServer) {
        let registry = self.registry.clone();
        server.register(METHOD_SERVER_CLIENT_ADD, move |info: ClientInfo| {
            let registry = registry.clone();
            async move {
                match registry.register(&info).await {
                    Ok(()) => RespCommon::success(),
                    Err(e) => {
                        tracing::error!(worker = %info.name, error = %e, "worker registration failed");
                        RespCommon::error(e.to_string())
                    }
                }
            }
        });

        server.register(METHOD_SERVER_CLIENT_PING, |_arg: String| async {
            RespCommon::success()
        });
    }
}
