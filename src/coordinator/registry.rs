use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::error::{FleetError, Result};
use crate::rpc::wire::{ClientInfo, RespCommon, METHOD_CLIENT_ADD, METHOD_JOB_ADD};
use crate::rpc::RpcClient;
use crate::scheduler::Job;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Ok,
    Degraded,
}

/// Coordinator-side view of one worker. The `jobs` map is the desired set
/// as the coordinator understands it; it survives disconnects so recovery
/// can replay it. Records are never evicted while the process lives.
pub struct WorkerRecord {
    pub uri: String,
    pub group: String,
    pub conn: Arc<RpcClient>,
    pub status: WorkerStatus,
    pub jobs: HashMap<i64, Job>,
    /// Serializes operator commands against this worker. Liveness pings
    /// bypass it; the transport interleaves them by sequence number.
    pub ops: Arc<Mutex<()>>,
}

/// What fan-out tasks carry out of a registry snapshot: enough to call the
/// worker without holding the registry lock across the RPC.
#[derive(Clone)]
pub struct WorkerHandle {
    pub name: String,
    pub uri: String,
    pub status: WorkerStatus,
    pub conn: Arc<RpcClient>,
    pub ops: Arc<Mutex<()>>,
}

#[derive(Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, WorkerRecord>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a worker, or re-attach a known one.
    ///
    /// A record that is already OK makes this a no-op, so repeated
    /// self-registrations are free. Otherwise: dial the worker, confirm
    /// the fresh connection with the `Client.ClientAdd` handshake, install
    /// it, and replay every enabled job from the surviving desired set.
    pub async fn register(&self, info: &ClientInfo) -> Result<()> {
        {
            let workers = self.workers.read().await;
            if let Some(record) = workers.get(&info.name) {
                if record.status == WorkerStatus::Ok {
                    return Ok(());
                }
            }
        }

        let conn = Arc::new(RpcClient::connect(&info.uri).await?);
        let handshake: RespCommon = conn
            .call(METHOD_CLIENT_ADD, &"Server".to_string())
            .await?;
        if !handshake.is_success() {
            return Err(FleetError::Remote(handshake.msg));
        }

        let replay: Vec<Job> = {
            let mut workers = self.workers.write().await;
            match workers.get_mut(&info.name) {
                Some(record) => {
                    record.uri = info.uri.clone();
                    record.group = info.group.clone();
                    record.conn = conn.clone();
                    record.status = WorkerStatus::Ok;
                    record.jobs.values().filter(|j| j.enabled).cloned().collect()
                }
                None => {
                    workers.insert(
                        info.name.clone(),
                        WorkerRecord {
                            uri: info.uri.clone(),
                            group: info.group.clone(),
                            conn: conn.clone(),
                            status: WorkerStatus::Ok,
                            jobs: HashMap::new(),
                            ops: Arc::new(Mutex::new(())),
                        },
                    );
                    Vec::new()
                }
            }
        };

        if replay.is_empty() {
            tracing::info!(worker = %info.name, uri = %info.uri, "worker registered");
        } else {
            tracing::info!(
                worker = %info.name,
                uri = %info.uri,
                jobs = replay.len(),
                "worker re-attached, replaying desired jobs"
            );
            for job in replay {
                let resp: Result<RespCommon> =
                    conn.call(METHOD_JOB_ADD, &job.enabled_projection()).await;
                match resp {
                    Ok(resp) if resp.is_success() => {}
                    Ok(resp) => {
                        tracing::error!(worker = %info.name, id = job.id, msg = %resp.msg, "replay refused")
                    }
                    Err(e) => {
                        tracing::error!(worker = %info.name, id = job.id, error = %e, "replay failed")
                    }
                }
            }
        }
        Ok(())
    }

    /// Re-dial a known worker using its recorded identity. The liveness
    /// loop calls this after a failed ping.
    pub async fn reattach(&self, name: &str) -> Result<()> {
        let info = {
            let workers = self.workers.read().await;
            let record = workers
                .get(name)
                .ok_or_else(|| FleetError::Validation(format!("unknown worker {name}")))?;
            ClientInfo {
                uri: record.uri.clone(),
                name: name.to_string(),
                group: record.group.clone(),
            }
        };
        self.register(&info).await
    }

    /// Degraded workers keep their record and desired set; only the status
    /// flips.
    pub async fn mark_degraded(&self, name: &str) {
        if let Some(record) = self.workers.write().await.get_mut(name) {
            if record.status != WorkerStatus::Degraded {
                record.status = WorkerStatus::Degraded;
                tracing::warn!(worker = %name, "worker degraded");
            }
        }
    }

    pub async fn status(&self, name: &str) -> Option<WorkerStatus> {
        self.workers.read().await.get(name).map(|r| r.status)
    }

    /// Snapshot for fan-out: every worker, or just the named one when the
    /// selector is non-empty. Names sort for deterministic iteration.
    pub async fn select(&self, selector: &str) -> Vec<WorkerHandle> {
        let workers = self.workers.read().await;
        let mut handles: Vec<WorkerHandle> = workers
            .iter()
            .filter(|(name, _)| selector.is_empty() || *name == selector)
            .map(|(name, record)| WorkerHandle {
                name: name.clone(),
                uri: record.uri.clone(),
                status: record.status,
                conn: record.conn.clone(),
                ops: record.ops.clone(),
            })
            .collect();
        handles.sort_by(|a, b| a.name.cmp(&b.name));
        handles
    }

    /// Overwrite cached entries with what the worker reported, then answer
    /// with the merged view. Entries the worker no longer runs (stopped
    /// jobs) stay cached, which is how listings still show them with
    /// `enabled: false`.
    pub async fn cache_merge(&self, name: &str, jobs: Vec<Job>) -> Vec<Job> {
        let mut workers = self.workers.write().await;
        let Some(record) = workers.get_mut(name) else {
            return Vec::new();
        };
        for job in jobs {
            record.jobs.insert(job.id, job);
        }
        let mut merged: Vec<Job> = record.jobs.values().cloned().collect();
        merged.sort_by_key(|j| j.id);
        merged
    }

    pub async fn cache_insert_if_absent(&self, name: &str, job: Job) {
        if let Some(record) = self.workers.write().await.get_mut(name) {
            record.jobs.entry(job.id).or_insert(job);
        }
    }

    pub async fn cache_remove(&self, name: &str, id: i64) {
        if let Some(record) = self.workers.write().await.get_mut(name) {
            record.jobs.remove(&id);
        }
    }

    pub async fn cache_set_enabled(&self, name: &str, id: i64, enabled: bool) {
        if let Some(record) = self.workers.write().await.get_mut(name) {
            if let Some(job) = record.jobs.get_mut(&id) {
                job.enabled = enabled;
            }
        }
    }

    pub async fn cache_get(&self, name: &str, id: i64) -> Option<Job> {
        self.workers
            .read()
            .await
            .get(name)
            .and_then(|record| record.jobs.get(&id).cloned())
    }
}
