use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{FleetError, Result};
use crate::scheduler::Job;
use crate::worker::runner::ProcessRunner;

/// Standard Unix cron is five fields (minute hour dom month dow) but the
/// `cron` crate wants a seconds column, so five-field expressions get `0`
/// prepended. Six- and seven-field expressions pass through unchanged.
fn normalize_spec(spec: &str) -> String {
    if spec.split_whitespace().count() == 5 {
        format!("0 {spec}")
    } else {
        spec.to_string()
    }
}

pub fn parse_spec(spec: &str) -> Result<Schedule> {
    Schedule::from_str(&normalize_spec(spec)).map_err(|e| FleetError::InvalidSpec {
        spec: spec.to_string(),
        reason: e.to_string(),
    })
}

/// Effective argv for one tick: `ssh <server> <script>` when the job names
/// a remote host, the script alone otherwise. Tokenized on ASCII
/// whitespace; there is deliberately no shell quoting.
fn build_argv(job: &Job) -> Vec<String> {
    let command = if job.server.is_empty() {
        job.script.clone()
    } else {
        format!("ssh {} {}", job.server, job.script)
    };
    command.split_ascii_whitespace().map(str::to_string).collect()
}

/// Run state written by an entry's cron task and read by listings. Shared
/// so an edit-in-place can hand the new entry the old one's PID, keeping
/// overlap protection continuous across edits.
#[derive(Debug, Default)]
struct RunState {
    pid: Option<u32>,
    prev: Option<DateTime<Utc>>,
}

struct Entry {
    job: Job,
    fingerprint: u128,
    schedule: Schedule,
    run: Arc<Mutex<RunState>>,
    cancel: CancellationToken,
}

/// The worker's local scheduler: a table of cron entries keyed by job id,
/// each backed by its own timer task. Driven by RPC from the coordinator
/// and, optionally, by the file reconciler; both paths funnel through
/// [`TaskTable::add_job`] and may interleave freely.
pub struct TaskTable {
    entries: Mutex<HashMap<i64, Entry>>,
    runner: Arc<ProcessRunner>,
}

impl TaskTable {
    pub fn new(runner: Arc<ProcessRunner>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            runner,
        }
    }

    /// Reconcile one job into the table.
    ///
    /// Unknown id and enabled: register a cron entry. Known id with the
    /// same fingerprint: no-op, the existing entry and its timer survive.
    /// Known id with a changed fingerprint: the replacement entry starts
    /// before the old one is cancelled, so no tick can fall into a gap.
    /// Disabled: drop any entry. Rejects unparseable cron expressions.
    pub async fn add_job(&self, job: Job) -> Result<()> {
        let schedule = parse_spec(&job.spec)?;
        let mut entries = self.entries.lock().await;

        if !job.enabled {
            if let Some(old) = entries.remove(&job.id) {
                old.cancel.cancel();
                tracing::info!(id = job.id, "job disabled, entry dropped");
            }
            return Ok(());
        }

        let fingerprint = job.fingerprint();
        let run = match entries.get(&job.id) {
            Some(existing) if existing.fingerprint == fingerprint => return Ok(()),
            // Edited under a stable id: carry the run state over.
            Some(existing) => existing.run.clone(),
            None => Arc::new(Mutex::new(RunState::default())),
        };

        let id = job.id;
        let entry = self.start_entry(job, fingerprint, schedule, run);
        if let Some(old) = entries.insert(id, entry) {
            old.cancel.cancel();
            tracing::info!(id, "job edited, entry replaced");
        } else {
            tracing::info!(id, "job added");
        }
        Ok(())
    }

    /// Idempotent: removing an unknown id is success.
    pub async fn remove_job(&self, id: i64) {
        if let Some(old) = self.entries.lock().await.remove(&id) {
            old.cancel.cancel();
            tracing::info!(id, "job removed");
        }
    }

    /// Snapshot of every entry projected to the external job shape, with
    /// `prev`, `next`, `pid` and `state` filled in. PID probes happen
    /// after the table lock is released.
    pub async fn list_jobs(&self) -> Vec<Job> {
        let snapshot: Vec<(Job, Schedule, Arc<Mutex<RunState>>)> = self
            .entries
            .lock()
            .await
            .values()
            .map(|e| (e.job.clone(), e.schedule.clone(), e.run.clone()))
            .collect();

        let mut jobs = Vec::with_capacity(snapshot.len());
        for (mut job, schedule, run) in snapshot {
            let (pid, prev) = {
                let state = run.lock().await;
                (state.pid, state.prev)
            };
            let alive = match pid {
                Some(pid) => self.runner.is_alive(pid).await,
                None => false,
            };
            job.prev = prev.map(|t| t.to_rfc3339()).unwrap_or_default();
            job.next = schedule
                .upcoming(Utc)
                .next()
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            job.pid = pid;
            job.state = if alive { "running" } else { "idle" }.to_string();
            jobs.push(job);
        }
        jobs.sort_by_key(|j| j.id);
        jobs
    }

    pub async fn contains(&self, id: i64) -> bool {
        self.entries.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    fn start_entry(
        &self,
        job: Job,
        fingerprint: u128,
        schedule: Schedule,
        run: Arc<Mutex<RunState>>,
    ) -> Entry {
        let cancel = CancellationToken::new();
        let task = EntryTask {
            job: job.clone(),
            schedule: schedule.clone(),
            runner: self.runner.clone(),
            run: run.clone(),
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run());
        Entry {
            job,
            fingerprint,
            schedule,
            run,
            cancel,
        }
    }
}

/// The timer task behind one entry: sleep until the next cron occurrence,
/// fire, repeat until cancelled.
struct EntryTask {
    job: Job,
    schedule: Schedule,
    runner: Arc<ProcessRunner>,
    run: Arc<Mutex<RunState>>,
    cancel: CancellationToken,
}

impl EntryTask {
    async fn run(self) {
        loop {
            let Some(next) = self.schedule.upcoming(Utc).next() else {
                tracing::warn!(id = self.job.id, spec = %self.job.spec, "no upcoming occurrence, entry parked");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
            self.fire(next).await;
        }
    }

    async fn fire(&self, at: DateTime<Utc>) {
        let last_pid = {
            let mut state = self.run.lock().await;
            state.prev = Some(at);
            state.pid
        };

        // At most one concurrent instance per job id: a previous child
        // still running or sleeping claims this tick.
        if let Some(pid) = last_pid {
            if self.runner.is_alive(pid).await {
                tracing::info!(id = self.job.id, pid, "previous run still alive, tick skipped");
                return;
            }
        }

        let argv = build_argv(&self.job);
        match self.runner.spawn(&argv, &self.job.dir) {
            Ok(pid) => {
                self.run.lock().await.pid = Some(pid);
                tracing::info!(id = self.job.id, pid, script = %self.job.script, "job launched");
            }
            Err(e) => {
                // Tick abandoned; the stale PID record stays as-is.
                tracing::error!(id = self.job.id, error = %e, "job spawn failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_field_specs_gain_a_seconds_column() {
        assert_eq!(normalize_spec("* * * * *"), "0 * * * * *");
        assert_eq!(normalize_spec("*/5 2 * * 1-5"), "0 */5 2 * * 1-5");
        assert_eq!(normalize_spec("0 * * * * *"), "0 * * * * *");
    }

    #[test]
    fn parse_spec_accepts_lists_ranges_steps() {
        assert!(parse_spec("* * * * *").is_ok());
        assert!(parse_spec("0,30 2-4 * * 1-5").is_ok());
        assert!(parse_spec("*/10 * * * *").is_ok());
        assert!(parse_spec("not a cron line").is_err());
        assert!(parse_spec("").is_err());
    }

    #[test]
    fn argv_is_whitespace_tokenized() {
        let mut job = Job {
            script: "/usr/bin/backup  --full\t/data".to_string(),
            ..Job::default()
        };
        assert_eq!(build_argv(&job), vec!["/usr/bin/backup", "--full", "/data"]);

        job.server = "db1".to_string();
        assert_eq!(
            build_argv(&job),
            vec!["ssh", "db1", "/usr/bin/backup", "--full", "/data"]
        );
    }

    fn enabled_job(id: i64, spec: &str) -> Job {
        Job {
            id,
            name: format!("job-{id}"),
            enabled: true,
            script: "/bin/true".to_string(),
            spec: spec.to_string(),
            ..Job::default()
        }
    }

    fn table() -> TaskTable {
        TaskTable::new(Arc::new(ProcessRunner::new()))
    }

    #[tokio::test]
    async fn add_is_idempotent_under_identical_fingerprint() {
        let table = table();
        table.add_job(enabled_job(1, "* * * * *")).await.unwrap();
        table.add_job(enabled_job(1, "* * * * *")).await.unwrap();
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn edit_replaces_the_single_entry() {
        let table = table();
        table.add_job(enabled_job(1, "* * * * *")).await.unwrap();
        table.add_job(enabled_job(1, "*/5 * * * *")).await.unwrap();

        let jobs = table.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].spec, "*/5 * * * *");
    }

    #[tokio::test]
    async fn disabled_add_drops_the_entry() {
        let table = table();
        table.add_job(enabled_job(2, "* * * * *")).await.unwrap();

        let mut disabled = enabled_job(2, "* * * * *");
        disabled.enabled = false;
        table.add_job(disabled).await.unwrap();
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let table = table();
        table.add_job(enabled_job(3, "* * * * *")).await.unwrap();
        table.remove_job(3).await;
        table.remove_job(3).await;
        table.remove_job(999).await;
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn invalid_spec_is_rejected_and_leaves_no_entry() {
        let table = table();
        match table.add_job(enabled_job(4, "bogus")).await {
            Err(FleetError::InvalidSpec { spec, .. }) => assert_eq!(spec, "bogus"),
            other => panic!("expected InvalidSpec, got {other:?}"),
        }
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn listing_derives_next_and_idle_state() {
        let table = table();
        // Annual spec: guaranteed not to fire while the test runs.
        table.add_job(enabled_job(5, "0 0 1 1 *")).await.unwrap();

        let jobs = table.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].state, "idle");
        assert!(jobs[0].prev.is_empty());
        assert!(!jobs[0].next.is_empty());
        assert!(jobs[0].pid.is_none());
    }
}
