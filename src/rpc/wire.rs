use serde::{Deserialize, Serialize};

use crate::scheduler::Job;

pub const CODE_SUCCESS: i32 = 0;
pub const CODE_ERROR: i32 = 1;
pub const MSG_SUCCESS: &str = "success";

// Methods served by a worker.
pub const METHOD_JOB_ADD: &str = "Client.JobAdd";
pub const METHOD_JOB_REMOVE: &str = "Client.JobRemove";
pub const METHOD_JOB_LIST: &str = "Client.JobList";
pub const METHOD_PING: &str = "Client.Ping";
/// Recovery handshake: the coordinator calls this on a fresh connection to
/// a previously degraded worker before replaying its desired jobs.
pub const METHOD_CLIENT_ADD: &str = "Client.ClientAdd";

// Methods served by the coordinator.
pub const METHOD_SERVER_CLIENT_ADD: &str = "Server.ClientAdd";
pub const METHOD_SERVER_CLIENT_PING: &str = "Server.ClientPing";

/// Status-plus-message reply shared by every mutating method. An operation
/// failed iff the transport errored or `code != 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespCommon {
    pub code: i32,
    pub msg: String,
}

impl RespCommon {
    pub fn success() -> Self {
        Self {
            code: CODE_SUCCESS,
            msg: MSG_SUCCESS.to_string(),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            code: CODE_ERROR,
            msg: msg.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == CODE_SUCCESS
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespList {
    pub code: i32,
    pub msg: String,
    pub jobs: Vec<Job>,
}

impl RespList {
    pub fn success(jobs: Vec<Job>) -> Self {
        Self {
            code: CODE_SUCCESS,
            msg: MSG_SUCCESS.to_string(),
            jobs,
        }
    }
}

/// Worker identity presented to the coordinator on self-registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub uri: String,
    pub name: String,
    pub group: String,
}
