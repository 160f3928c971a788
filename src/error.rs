use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("invalid cron spec {spec:?}: {reason}")]
    InvalidSpec { spec: String, reason: String },

    #[error("failed to spawn {command:?}: {source}")]
    Spawn { command: String, source: io::Error },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("wire encoding error: {0}")]
    Codec(#[from] bincode::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, FleetError>;
