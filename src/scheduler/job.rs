use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

/// A cron-scheduled shell command assigned to one worker.
///
/// The worker's local scheduler holds the authoritative copy; the
/// coordinator's per-worker cache is an eventually consistent projection of
/// it, used for listings and for recovery replay. `(worker, id)` uniquely
/// identifies a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub name: String,
    pub project: String,
    pub creator: String,
    #[serde(rename = "creat_time")]
    pub created_at: String,
    pub enabled: bool,
    /// Target worker name; empty means broadcast. Doubles as the ssh host
    /// prefix on the worker side when non-empty.
    pub server: String,
    pub script: String,
    /// Working directory for the child; empty inherits the worker's.
    pub dir: String,
    /// Five-field cron expression (six- and seven-field forms with a
    /// seconds column pass through unchanged).
    pub spec: String,
    pub group: String,

    // Derived on listing; meaningless on requests.
    #[serde(default)]
    pub prev: String,
    #[serde(default)]
    pub next: String,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub state: String,
}

impl Job {
    /// 128-bit digest over the fields that define what actually runs.
    /// A changed fingerprint under a stable id means the job was edited
    /// and its cron entry must be replaced.
    pub fn fingerprint(&self) -> u128 {
        let mut h = Xxh3::new();
        for part in [&self.script, &self.dir, &self.spec, &self.server] {
            h.update(part.as_bytes());
            h.update(&[0]);
        }
        h.digest128()
    }

    /// Copy sent over the wire on Add and recovery replay: enabled, with
    /// the derived fields cleared.
    pub fn enabled_projection(&self) -> Job {
        Job {
            enabled: true,
            prev: String::new(),
            next: String::new(),
            pid: None,
            state: String::new(),
            ..self.clone()
        }
    }
}
