use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::scheduler::{Job, TaskTable};

/// One line of the legacy self-reconcile file: a JSON array of these at a
/// local path, polled so file edits take effect without an RPC.
#[derive(Debug, Deserialize)]
pub struct FileJob {
    pub id: i64,
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub dir: String,
    #[serde(default)]
    pub spec: String,
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub enable: bool,
}

impl FileJob {
    fn into_job(self) -> Job {
        Job {
            id: self.id,
            enabled: self.enable,
            server: self.server,
            script: self.script,
            dir: self.dir,
            spec: self.spec,
            ..Job::default()
        }
    }
}

/// Poll `path` on `interval` and feed every entry through the same
/// `add_job` the RPC path uses, so the two are safe to interleave. The
/// first pass runs immediately on startup.
pub async fn run(
    path: String,
    interval: Duration,
    table: Arc<TaskTable>,
    shutdown: CancellationToken,
) {
    tracing::info!(file = %path, interval_secs = interval.as_secs(), "file reconciler running");
    let mut tick = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tick.tick() => {}
        }
        apply(&path, &table).await;
    }
}

async fn apply(path: &str, table: &TaskTable) {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(file = %path, error = %e, "reconcile file unreadable, pass skipped");
            return;
        }
    };
    let entries: Vec<FileJob> = match serde_json::from_str(&data) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(file = %path, error = %e, "reconcile file malformed, pass skipped");
            return;
        }
    };
    for entry in entries {
        let id = entry.id;
        if let Err(e) = table.add_job(entry.into_job()).await {
            tracing::warn!(id, error = %e, "reconcile entry rejected");
        }
    }
}
