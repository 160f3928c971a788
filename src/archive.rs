use std::sync::Arc;

use crate::config::MongoConfig;
use crate::scheduler::Job;

/// Write-through archival sink for operator mutations. The control plane
/// behaves identically whether a real document store is attached or not,
/// so the dispatcher records through this seam and moves on.
pub trait JobArchive: Send + Sync {
    fn record_add(&self, worker: &str, job: &Job);
    fn record_remove(&self, worker: &str, id: i64);
}

/// Default sink: structured log lines only.
pub struct LogArchive {
    collection: String,
}

impl JobArchive for LogArchive {
    fn record_add(&self, worker: &str, job: &Job) {
        tracing::debug!(
            collection = %self.collection,
            worker,
            id = job.id,
            name = %job.name,
            "archived job add"
        );
    }

    fn record_remove(&self, worker: &str, id: i64) {
        tracing::debug!(collection = %self.collection, worker, id, "archived job remove");
    }
}

pub fn from_config(mongo: &MongoConfig) -> Arc<dyn JobArchive> {
    if !mongo.uri.is_empty() {
        tracing::info!(
            database = %mongo.database,
            collection = %mongo.collection,
            "document-store archival configured, recording through the log sink"
        );
    }
    Arc::new(LogArchive {
        collection: mongo.collection.clone(),
    })
}
