use std::sync::Arc;

use crate::rpc::wire::{
    RespCommon, RespList, METHOD_CLIENT_ADD, METHOD_JOB_ADD, METHOD_JOB_LIST, METHOD_JOB_REMOVE,
    METHOD_PING,
};
use crate::rpc::RpcServer;
use crate::scheduler::{Job, TaskTable};

/// Wire the worker-side methods onto an RPC server. Everything the
/// coordinator can ask of a worker funnels through the task table.
pub fn register_methods(server: &mut RpcServer, table: Arc<TaskTable>) {
    let add_table = table.clone();
    server.register(METHOD_JOB_ADD, move |job: Job| {
        let table = add_table.clone();
        async move {
            match table.add_job(job).await {
                Ok(()) => RespCommon::success(),
                Err(e) => RespCommon::error(e.to_string()),
            }
        }
    });

    let remove_table = table.clone();
    server.register(METHOD_JOB_REMOVE, move |job: Job| {
        let table = remove_table.clone();
        async move {
            table.remove_job(job.id).await;
            RespCommon::success()
        }
    });

    let list_table = table;
    server.register(METHOD_JOB_LIST, move |_arg: String| {
        let table = list_table.clone();
        async move { RespList::success(table.list_jobs().await) }
    });

    server.register(METHOD_PING, |_arg: String| async { RespCommon::success() });

    // Re-attach handshake: the coordinator confirms a fresh connection
    // before replaying this worker's desired jobs.
    server.register(METHOD_CLIENT_ADD, |_arg: String| async {
        tracing::info!("coordinator re-attached");
        RespCommon::success()
    });
}
