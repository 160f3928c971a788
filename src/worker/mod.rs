//! Worker process: a local cron scheduler remote-controlled by the
//! coordinator.
//!
//! The worker serves the `Client.*` RPC methods, keeps itself registered
//! with the coordinator, and optionally reconciles a legacy local job file.
//! Everything mutates the one [`TaskTable`](crate::scheduler::TaskTable),
//! which owns the cron entries and their child processes.

pub mod reconcile;
pub mod runner;
pub mod service;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Result;
use crate::rpc::wire::{ClientInfo, RespCommon, METHOD_SERVER_CLIENT_ADD, METHOD_SERVER_CLIENT_PING};
use crate::rpc::{RpcClient, RpcServer};
use crate::scheduler::TaskTable;
use crate::worker::runner::ProcessRunner;

pub struct WorkerContext {
    pub config: Config,
    pub table: Arc<TaskTable>,
}

impl WorkerContext {
    pub fn new(config: Config) -> Self {
        let runner = Arc::new(ProcessRunner::new());
        Self {
            table: Arc::new(TaskTable::new(runner)),
            config,
        }
    }

    /// Serve the RPC surface, start the optional file reconciler, then
    /// hold the coordinator registration open until shutdown.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let listener = RpcServer::bind(&self.config.worker.uri).await?;
        tracing::info!(
            addr = %self.config.worker.uri,
            name = %self.config.worker.name,
            "worker rpc listening"
        );

        let mut server = RpcServer::new();
        service::register_methods(&mut server, self.table.clone());
        tokio::spawn(Arc::new(server).serve(listener, shutdown.clone()));

        if !self.config.worker.reconcile_file.is_empty() {
            tokio::spawn(reconcile::run(
                self.config.worker.reconcile_file.clone(),
                Duration::from_secs(self.config.worker.reconcile_interval_seconds.max(1)),
                self.table.clone(),
                shutdown.clone(),
            ));
        }

        self.registration_loop(shutdown).await;
        Ok(())
    }

    /// Worker half of the liveness protocol: register with the
    /// coordinator, then ping it on the shared interval. A failed ping
    /// drops back to registration, so a restarted coordinator re-learns
    /// this worker within one interval.
    async fn registration_loop(&self, shutdown: CancellationToken) {
        let info = ClientInfo {
            uri: self.config.worker.uri.clone(),
            name: self.config.worker.name.clone(),
            group: self.config.worker.group.clone(),
        };
        let coordinator = self.config.server.uri.clone();
        let mut tick = tokio::time::interval(self.config.ping_interval());
        let mut conn: Option<RpcClient> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tick.tick() => {}
            }

            match &conn {
                None => match RpcClient::connect(&coordinator).await {
                    Ok(client) => {
                        match client
                            .call::<_, RespCommon>(METHOD_SERVER_CLIENT_ADD, &info)
                            .await
                        {
                            Ok(resp) if resp.is_success() => {
                                tracing::info!(coordinator = %coordinator, "registered with coordinator");
                                conn = Some(client);
                            }
                            Ok(resp) => {
                                tracing::warn!(msg = %resp.msg, "registration refused");
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "registration call failed");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(coordinator = %coordinator, error = %e, "coordinator unreachable");
                    }
                },
                Some(client) => {
                    let healthy = matches!(
                        client
                            .call::<_, RespCommon>(METHOD_SERVER_CLIENT_PING, &"Client".to_string())
                            .await,
                        Ok(resp) if resp.is_success()
                    );
                    if !healthy {
                        tracing::warn!(coordinator = %coordinator, "lost coordinator, re-registering");
                        conn = None;
                    }
                }
            }
        }
    }
}
