//! End-to-end scenarios: operator API → dispatcher → RPC → worker
//! scheduler, with real sockets between the processes' halves.


use std::time::Duration;

use serde_json::{json, Value};

use cronfleet::coordinator::registry::WorkerStatus;
use test_harness::{assert_eventually, free_port, TestCoordinator, TestWorker};

const PING: Duration = Duration::from_millis(300);

fn add_body(id: i64, server: &str, spec: &str) -> Value {
    json!({
        "id": id,
        "name": "n",
        "project": "p",
        "creator": "c",
        "creat_time": "t",
        "script": "/bin/true",
        "spec": spec,
        "server": server,
    })
}

async fn wait_registered(coord: &TestCoordinator, name: &'static str) {
    let registry = coord.ctx.registry.clone();
    assert_eventually(
        || {
            let registry = registry.clone();
            async move { registry.status(name).await == Some(WorkerStatus::Ok) }
        },
        Duration::from_secs(5),
        "worker never registered",
    )
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn add_then_list_roundtrip() {
    let coord = TestCoordinator::start(PING).await;
    let w1 = TestWorker::start("w1", free_port(), &coord.rpc_addr).await;
    wait_registered(&coord, "w1").await;

    let resp = coord
        .api_post("/api/job/add", add_body(1, "w1", "* * * * *"))
        .await;
    assert_eq!(resp["code"], 0);
    assert_eq!(resp["data"]["w1"], true);

    let resp = coord.api_post("/api/job/list", json!({})).await;
    assert_eq!(resp["code"], 0);
    let jobs = resp["data"]["w1"].as_array().expect("w1 listing");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], 1);
    assert_eq!(jobs[0]["script"], "/bin/true");
    assert_eq!(jobs[0]["enabled"], true);

    assert!(w1.table.contains(1).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_then_start_toggles_enabled() {
    let coord = TestCoordinator::start(PING).await;
    let w1 = TestWorker::start("w1", free_port(), &coord.rpc_addr).await;
    wait_registered(&coord, "w1").await;

    let resp = coord
        .api_post("/api/job/add", add_body(1, "w1", "* * * * *"))
        .await;
    assert_eq!(resp["data"]["w1"], true);

    let resp = coord.api_post("/api/job/stop", json!({"id": 1})).await;
    assert_eq!(resp["code"], 0);
    assert_eq!(resp["data"]["w1"], true);
    assert!(!w1.table.contains(1).await);

    // The stopped job is off the worker but still listed from the cache.
    let resp = coord.api_post("/api/job/list", json!({})).await;
    let jobs = resp["data"]["w1"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["enabled"], false);

    let resp = coord.api_post("/api/job/start", json!({"id": 1})).await;
    assert_eq!(resp["code"], 0);
    assert_eq!(resp["data"]["w1"], true);
    assert!(w1.table.contains(1).await);

    let resp = coord.api_post("/api/job/list", json!({})).await;
    let jobs = resp["data"]["w1"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["enabled"], true);
}

#[tokio::test(flavor = "multi_thread")]
async fn edit_in_place_keeps_one_entry() {
    let coord = TestCoordinator::start(PING).await;
    let w1 = TestWorker::start("w1", free_port(), &coord.rpc_addr).await;
    wait_registered(&coord, "w1").await;

    coord
        .api_post("/api/job/add", add_body(1, "w1", "* * * * *"))
        .await;
    let resp = coord
        .api_post("/api/job/add", add_body(1, "w1", "*/5 * * * *"))
        .await;
    assert_eq!(resp["data"]["w1"], true);

    assert_eq!(w1.table.len().await, 1);
    let jobs = w1.table.list_jobs().await;
    assert_eq!(jobs[0].spec, "*/5 * * * *");

    let resp = coord.api_post("/api/job/list", json!({})).await;
    let jobs = resp["data"]["w1"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["spec"], "*/5 * * * *");
}

#[tokio::test(flavor = "multi_thread")]
async fn degraded_worker_recovers_with_replay() {
    let coord = TestCoordinator::start(PING).await;
    let port = free_port();
    let w1 = TestWorker::start("w1", port, &coord.rpc_addr).await;
    wait_registered(&coord, "w1").await;

    let resp = coord
        .api_post("/api/job/add", add_body(1, "w1", "* * * * *"))
        .await;
    assert_eq!(resp["data"]["w1"], true);

    // Kill the worker; within a few ping intervals it must degrade.
    w1.stop();
    let registry = coord.ctx.registry.clone();
    assert_eventually(
        || {
            let registry = registry.clone();
            async move { registry.status("w1").await == Some(WorkerStatus::Degraded) }
        },
        Duration::from_secs(5),
        "worker never degraded after kill",
    )
    .await;

    // Restart on the same port: the registry re-attaches and replays the
    // enabled desired set into the fresh, empty scheduler.
    let revived = TestWorker::start("w1", port, &coord.rpc_addr).await;
    wait_registered(&coord, "w1").await;

    let table = revived.table.clone();
    assert_eventually(
        || {
            let table = table.clone();
            async move { table.contains(1).await }
        },
        Duration::from_secs(5),
        "desired job never replayed after recovery",
    )
    .await;

    let resp = coord.api_post("/api/job/list", json!({"server": "w1"})).await;
    let jobs = resp["data"]["w1"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn broadcast_add_reaches_every_worker() {
    let coord = TestCoordinator::start(PING).await;
    let w1 = TestWorker::start("w1", free_port(), &coord.rpc_addr).await;
    let w2 = TestWorker::start("w2", free_port(), &coord.rpc_addr).await;
    wait_registered(&coord, "w1").await;
    wait_registered(&coord, "w2").await;

    let resp = coord
        .api_post("/api/job/add", add_body(1, "", "* * * * *"))
        .await;
    assert_eq!(resp["code"], 0);
    assert_eq!(resp["data"]["w1"], true);
    assert_eq!(resp["data"]["w2"], true);

    assert!(w1.table.contains(1).await);
    assert!(w2.table.contains(1).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn unicast_add_skips_other_workers() {
    let coord = TestCoordinator::start(PING).await;
    let w1 = TestWorker::start("w1", free_port(), &coord.rpc_addr).await;
    let w2 = TestWorker::start("w2", free_port(), &coord.rpc_addr).await;
    wait_registered(&coord, "w1").await;
    wait_registered(&coord, "w2").await;

    let resp = coord
        .api_post("/api/job/add", add_body(1, "w2", "* * * * *"))
        .await;
    assert_eq!(resp["code"], 0);
    assert!(resp["data"]["w1"].is_null());
    assert_eq!(resp["data"]["w2"], true);

    assert!(!w1.table.contains(1).await);
    assert!(w2.table.contains(1).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn remove_clears_worker_and_cache() {
    let coord = TestCoordinator::start(PING).await;
    let w1 = TestWorker::start("w1", free_port(), &coord.rpc_addr).await;
    wait_registered(&coord, "w1").await;

    coord
        .api_post("/api/job/add", add_body(1, "w1", "* * * * *"))
        .await;
    let resp = coord.api_post("/api/job/remove", json!({"id": 1})).await;
    assert_eq!(resp["code"], 0);
    assert_eq!(resp["data"]["w1"], true);
    assert!(!w1.table.contains(1).await);

    // Gone from listings too: the cache entry was deleted, not disabled.
    let resp = coord.api_post("/api/job/list", json!({})).await;
    let jobs = resp["data"]["w1"].as_array().unwrap();
    assert!(jobs.is_empty());

    // And removing it again is still a success.
    let resp = coord.api_post("/api/job/remove", json!({"id": 1})).await;
    assert_eq!(resp["data"]["w1"], true);
}

#[tokio::test(flavor = "multi_thread")]
async fn add_with_bad_spec_reports_false_for_the_worker() {
    let coord = TestCoordinator::start(PING).await;
    let w1 = TestWorker::start("w1", free_port(), &coord.rpc_addr).await;
    wait_registered(&coord, "w1").await;

    let resp = coord
        .api_post("/api/job/add", add_body(1, "w1", "not a cron line"))
        .await;
    // The request binds fine; the worker rejects the spec, so the
    // per-worker outcome is false and nothing is cached.
    assert_eq!(resp["code"], 0);
    assert_eq!(resp["data"]["w1"], false);
    assert!(!w1.table.contains(1).await);

    let resp = coord.api_post("/api/job/list", json!({})).await;
    assert!(resp["data"]["w1"].as_array().unwrap().is_empty());
}
