//! Operator-facing JSON API.
//!
//! Every route is a POST returning HTTP 200 with a `{code, data?, msg?}`
//! envelope; binding or validation failures answer `{code: 1}` and have no
//! side effects. The handlers are thin bindings onto the dispatcher.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::coordinator::CoordinatorContext;
use crate::error::FleetError;
use crate::rpc::wire::{CODE_ERROR, CODE_SUCCESS};
use crate::scheduler::Job;
use crate::shutdown::DRAIN_DEADLINE;

#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<String>,
}

fn success<T: Serialize>(data: T) -> Response {
    Json(ApiResponse {
        code: CODE_SUCCESS,
        data: Some(data),
        msg: None,
    })
    .into_response()
}

fn failure() -> Response {
    Json(ApiResponse::<()> {
        code: CODE_ERROR,
        data: None,
        msg: Some("error".to_string()),
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ReqJobList {
    #[serde(default)]
    pub server: String,
}

#[derive(Debug, Deserialize)]
pub struct ReqJobAdd {
    pub id: i64,
    pub name: String,
    pub project: String,
    pub creator: String,
    pub creat_time: String,
    #[serde(default)]
    pub server: String,
    pub script: String,
    #[serde(default)]
    pub dir: String,
    pub spec: String,
    #[serde(default)]
    pub group: String,
}

impl ReqJobAdd {
    /// Same rules the original binding applied: required fields must be
    /// present and non-zero-valued.
    fn validate(&self) -> bool {
        self.id != 0
            && !self.name.is_empty()
            && !self.project.is_empty()
            && !self.creator.is_empty()
            && !self.creat_time.is_empty()
            && !self.script.is_empty()
            && !self.spec.is_empty()
    }

    fn into_job(self) -> Job {
        Job {
            id: self.id,
            name: self.name,
            project: self.project,
            creator: self.creator,
            created_at: self.creat_time,
            enabled: true,
            server: self.server,
            script: self.script,
            dir: self.dir,
            spec: self.spec,
            group: self.group,
            ..Job::default()
        }
    }
}

/// Shared shape of remove/start/stop requests.
#[derive(Debug, Deserialize)]
pub struct ReqJobId {
    pub id: i64,
    #[serde(default)]
    pub server: String,
}

pub fn router(ctx: Arc<CoordinatorContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/job/list", post(job_list))
        .route("/api/job/add", post(job_add))
        .route("/api/job/remove", post(job_remove))
        .route("/api/job/start", post(job_start))
        .route("/api/job/stop", post(job_stop))
        .layer(cors)
        .with_state(ctx)
}

pub async fn job_list(
    State(ctx): State<Arc<CoordinatorContext>>,
    body: Result<Json<ReqJobList>, JsonRejection>,
) -> Response {
    ctx.trace_api("/api/job/list");
    let Ok(Json(req)) = body else {
        return failure();
    };
    success(ctx.dispatcher.list_jobs(&req.server).await)
}

pub async fn job_add(
    State(ctx): State<Arc<CoordinatorContext>>,
    body: Result<Json<ReqJobAdd>, JsonRejection>,
) -> Response {
    ctx.trace_api("/api/job/add");
    let Ok(Json(req)) = body else {
        return failure();
    };
    if !req.validate() {
        return failure();
    }
    let job = req.into_job();
    success(ctx.dispatcher.add_job(&job).await)
}

pub async fn job_remove(
    State(ctx): State<Arc<CoordinatorContext>>,
    body: Result<Json<ReqJobId>, JsonRejection>,
) -> Response {
    ctx.trace_api("/api/job/remove");
    let Ok(Json(req)) = body else {
        return failure();
    };
    if req.id == 0 {
        return failure();
    }
    success(ctx.dispatcher.remove_job(req.id, &req.server).await)
}

pub async fn job_start(
    State(ctx): State<Arc<CoordinatorContext>>,
    body: Result<Json<ReqJobId>, JsonRejection>,
) -> Response {
    ctx.trace_api("/api/job/start");
    let Ok(Json(req)) = body else {
        return failure();
    };
    if req.id == 0 {
        return failure();
    }
    success(ctx.dispatcher.start_job(req.id, &req.server).await)
}

pub async fn job_stop(
    State(ctx): State<Arc<CoordinatorContext>>,
    body: Result<Json<ReqJobId>, JsonRejection>,
) -> Response {
    ctx.trace_api("/api/job/stop");
    let Ok(Json(req)) = body else {
        return failure();
    };
    if req.id == 0 {
        return failure();
    }
    success(ctx.dispatcher.stop_job(req.id, &req.server).await)
}

/// Bind and serve the operator API until shutdown, then drain with a
/// fixed deadline; in-flight requests past the deadline are abandoned.
pub async fn serve(
    ctx: Arc<CoordinatorContext>,
    shutdown: CancellationToken,
) -> crate::error::Result<()> {
    let addr = ctx.config.api.uri.clone();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| FleetError::Bind {
            addr: addr.clone(),
            source,
        })?;
    tracing::info!(addr = %addr, "operator api listening");

    let app = router(ctx);
    let drained = shutdown.clone().cancelled_owned();
    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(drained)
            .await
    };

    tokio::select! {
        res = server => res.map_err(|e| FleetError::Transport(e.to_string()))?,
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(DRAIN_DEADLINE).await;
        } => {
            tracing::warn!("drain deadline reached, abandoning in-flight requests");
        }
    }
    Ok(())
}
