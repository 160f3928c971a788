//! Task table behavior that needs real time: cron firing, overlap
//! protection, and run-state bookkeeping. Six-field (secondly) specs keep
//! the waits short; the normalization path they share with five-field
//! specs is covered by unit tests.

use std::sync::Arc;
use std::time::Duration;

use cronfleet::scheduler::{Job, TaskTable};
use cronfleet::worker::runner::ProcessRunner;

fn table() -> TaskTable {
    TaskTable::new(Arc::new(ProcessRunner::new()))
}

fn job(id: i64, script: &str, spec: &str) -> Job {
    Job {
        id,
        name: format!("job-{id}"),
        enabled: true,
        script: script.to_string(),
        spec: spec.to_string(),
        ..Job::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn firing_records_pid_and_prev() {
    let table = table();
    table
        .add_job(job(1, "sleep 3", "* * * * * *"))
        .await
        .unwrap();

    // First fire happens at the next second boundary.
    tokio::time::sleep(Duration::from_millis(1400)).await;

    let jobs = table.list_jobs().await;
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].pid.is_some(), "no pid after first fire");
    assert!(!jobs[0].prev.is_empty(), "prev not recorded");
    assert_eq!(jobs[0].state, "running");
}

#[tokio::test(flavor = "multi_thread")]
async fn overlapping_tick_does_not_spawn_a_second_child() {
    let table = table();
    table
        .add_job(job(1, "sleep 3", "* * * * * *"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1400)).await;
    let first = table.list_jobs().await[0].pid.expect("first fire");

    // Two more ticks pass while the child sleeps; both must be skipped.
    tokio::time::sleep(Duration::from_millis(1900)).await;
    let second = table.list_jobs().await[0].pid.expect("pid retained");
    assert_eq!(first, second, "overlap protection spawned a new child");
}

#[tokio::test(flavor = "multi_thread")]
async fn finished_child_frees_the_next_tick() {
    let table = table();
    table
        .add_job(job(1, "sleep 1", "* * * * * *"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1400)).await;
    let first = table.list_jobs().await[0].pid.expect("first fire");

    // Child exits after ~1s; a later tick is free to spawn again.
    let mut second = first;
    for _ in 0..8 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        if let Some(pid) = table.list_jobs().await[0].pid {
            if pid != first {
                second = pid;
                break;
            }
        }
    }
    assert_ne!(first, second, "scheduler never spawned after child exit");
}

#[tokio::test(flavor = "multi_thread")]
async fn removed_job_stops_firing() {
    let table = table();
    table
        .add_job(job(1, "sleep 3", "* * * * * *"))
        .await
        .unwrap();
    table.remove_job(1).await;

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(table.is_empty().await);
}

#[tokio::test(flavor = "multi_thread")]
async fn edit_carries_run_state_into_the_replacement() {
    let table = table();
    table
        .add_job(job(1, "sleep 5", "* * * * * *"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1400)).await;
    let pid = table.list_jobs().await[0].pid.expect("first fire");

    // Edit the schedule while the child is alive: the new entry must see
    // the old PID so overlap protection stays continuous.
    let edited = job(1, "sleep 5", "*/1 * * * * *");
    table.add_job(edited).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1900)).await;
    let jobs = table.list_jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].pid, Some(pid), "edit lost the tracked child");
}

#[tokio::test(flavor = "multi_thread")]
async fn spawn_failure_abandons_the_tick() {
    let table = table();
    table
        .add_job(job(1, "/no/such/binary --flag", "* * * * * *"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1400)).await;
    let jobs = table.list_jobs().await;
    // prev advances (the tick happened) but no PID was ever recorded.
    assert!(!jobs[0].prev.is_empty());
    assert!(jobs[0].pid.is_none());
    assert_eq!(jobs[0].state, "idle");
}
