use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use crate::archive::JobArchive;
use crate::coordinator::registry::{WorkerHandle, WorkerRegistry};
use crate::rpc::wire::{
    RespCommon, RespList, CODE_SUCCESS, METHOD_JOB_ADD, METHOD_JOB_LIST, METHOD_JOB_REMOVE,
};
use crate::scheduler::Job;

/// Maps one operator command onto per-worker RPCs: concurrent across
/// workers, serialized per worker through the record's operation lock, and
/// gathered before returning so no stragglers outlive the API call.
pub struct Dispatcher {
    registry: Arc<WorkerRegistry>,
    archive: Arc<dyn JobArchive>,
}

impl Dispatcher {
    pub fn new(registry: Arc<WorkerRegistry>, archive: Arc<dyn JobArchive>) -> Self {
        Self { registry, archive }
    }

    /// Pull each selected worker's live jobs, fold them into the cache,
    /// and answer with the merged per-worker view. A worker that fails to
    /// answer is omitted entirely.
    pub async fn list_jobs(&self, selector: &str) -> HashMap<String, Vec<Job>> {
        let targets = self.registry.select(selector).await;
        let results = join_all(targets.into_iter().map(|w| {
            let registry = self.registry.clone();
            async move {
                let _ops = w.ops.lock().await;
                match w
                    .conn
                    .call::<_, RespList>(METHOD_JOB_LIST, &String::new())
                    .await
                {
                    Ok(resp) if resp.code == CODE_SUCCESS => {
                        let merged = registry.cache_merge(&w.name, resp.jobs).await;
                        Some((w.name, merged))
                    }
                    Ok(resp) => {
                        tracing::error!(worker = %w.name, msg = %resp.msg, "job list refused");
                        None
                    }
                    Err(e) => {
                        tracing::error!(worker = %w.name, error = %e, "job list failed");
                        None
                    }
                }
            }
        }))
        .await;
        results.into_iter().flatten().collect()
    }

    /// Push a job to every selected worker (the job's own `server` field
    /// is the selector: empty broadcasts). Cache gains the job on each
    /// worker that accepted it.
    pub async fn add_job(&self, job: &Job) -> HashMap<String, bool> {
        let targets = self.registry.select(&job.server).await;
        let results = join_all(targets.into_iter().map(|w| {
            let registry = self.registry.clone();
            let archive = self.archive.clone();
            let job = job.clone();
            async move {
                let _ops = w.ops.lock().await;
                let ok = call_ok(&w, METHOD_JOB_ADD, &job.enabled_projection(), "job add").await;
                if ok {
                    registry.cache_insert_if_absent(&w.name, job.clone()).await;
                    archive.record_add(&w.name, &job);
                    tracing::info!(worker = %w.name, id = job.id, "job add success");
                }
                (w.name, ok)
            }
        }))
        .await;
        results.into_iter().collect()
    }

    /// Remove by id. The cache entry goes away on every outcome, success
    /// or not: the operator asked for the job to be gone, and a worker
    /// that failed mid-call converges through liveness replay, which only
    /// pushes what the cache still holds.
    pub async fn remove_job(&self, id: i64, selector: &str) -> HashMap<String, bool> {
        let probe = Job {
            id,
            ..Job::default()
        };
        let targets = self.registry.select(selector).await;
        let results = join_all(targets.into_iter().map(|w| {
            let registry = self.registry.clone();
            let archive = self.archive.clone();
            let probe = probe.clone();
            async move {
                let _ops = w.ops.lock().await;
                let ok = call_ok(&w, METHOD_JOB_REMOVE, &probe, "job remove").await;
                registry.cache_remove(&w.name, id).await;
                archive.record_remove(&w.name, id);
                if ok {
                    tracing::info!(worker = %w.name, id, "job remove success");
                }
                (w.name, ok)
            }
        }))
        .await;
        results.into_iter().collect()
    }

    /// Re-enable a stopped job from its cached definition. Workers whose
    /// cache never saw the id are skipped, not failed.
    pub async fn start_job(&self, id: i64, selector: &str) -> HashMap<String, bool> {
        let targets = self.registry.select(selector).await;
        let results = join_all(targets.into_iter().map(|w| {
            let registry = self.registry.clone();
            async move {
                let cached = registry.cache_get(&w.name, id).await?;
                let _ops = w.ops.lock().await;
                let ok = call_ok(&w, METHOD_JOB_ADD, &cached.enabled_projection(), "job start").await;
                if ok {
                    registry.cache_set_enabled(&w.name, id, true).await;
                    tracing::info!(worker = %w.name, id, "job start success");
                }
                Some((w.name, ok))
            }
        }))
        .await;
        results.into_iter().flatten().collect()
    }

    /// Take a job off the worker but keep its cached definition, flipped
    /// to disabled, so Start can resurrect it.
    pub async fn stop_job(&self, id: i64, selector: &str) -> HashMap<String, bool> {
        let probe = Job {
            id,
            ..Job::default()
        };
        let targets = self.registry.select(selector).await;
        let results = join_all(targets.into_iter().map(|w| {
            let registry = self.registry.clone();
            let probe = probe.clone();
            async move {
                let _ops = w.ops.lock().await;
                let ok = call_ok(&w, METHOD_JOB_REMOVE, &probe, "job stop").await;
                if ok {
                    registry.cache_set_enabled(&w.name, id, false).await;
                    tracing::info!(worker = %w.name, id, "job stop success");
                }
                (w.name, ok)
            }
        }))
        .await;
        results.into_iter().collect()
    }
}

async fn call_ok<A: serde::Serialize>(
    worker: &WorkerHandle,
    method: &str,
    arg: &A,
    what: &str,
) -> bool {
    match worker.conn.call::<_, RespCommon>(method, arg).await {
        Ok(resp) if resp.is_success() => true,
        Ok(resp) => {
            tracing::error!(worker = %worker.name, msg = %resp.msg, "{what} refused");
            false
        }
        Err(e) => {
            tracing::error!(worker = %worker.name, error = %e, "{what} failed");
            false
        }
    }
}
