use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::coordinator::registry::WorkerRegistry;
use crate::rpc::wire::{RespCommon, METHOD_PING};

/// Coordinator half of the liveness protocol. Every tick pings all workers
/// concurrently; a failed ping degrades the worker and attempts one
/// re-attach in the same tick. The loop itself only stops on shutdown —
/// individual worker failures never do more than mark the record.
pub async fn run(registry: Arc<WorkerRegistry>, interval: Duration, shutdown: CancellationToken) {
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("liveness loop stopping");
                return;
            }
            _ = tick.tick() => {}
        }

        let workers = registry.select("").await;
        join_all(workers.into_iter().map(|w| {
            let registry = registry.clone();
            async move {
                let healthy = matches!(
                    w.conn
                        .call::<_, RespCommon>(METHOD_PING, &"Server".to_string())
                        .await,
                    Ok(resp) if resp.is_success()
                );
                if healthy {
                    return;
                }

                registry.mark_degraded(&w.name).await;
                if let Err(e) = registry.reattach(&w.name).await {
                    tracing::warn!(worker = %w.name, error = %e, "re-attach failed, will retry next tick");
                }
            }
        }))
        .await;
    }
}
